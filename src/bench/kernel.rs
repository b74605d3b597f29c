//! Arithmetic workload kernels
//!
//! Four fixed loops (32/64-bit, floating/integer) whose per-iteration
//! operation counts are known constants. Throughput figures everywhere in the
//! crate are derived from these constants, so a change to a loop body must be
//! matched by a change to the corresponding constant.

use std::fmt;
use std::hint::black_box;
use serde::{Deserialize, Serialize};
use crate::bench::clock::Stopwatch;
use crate::{Result, XopsError};

/// Operations per iteration of the floating point loops.
///
/// counter += 1, counter < max, x * x, 4 * x2, pi2 - _, pi2 + x2, y / _, x += inc
pub const FLOPS_PER_ITERATION: u32 = 8;

/// Operations per iteration of the integer loops.
///
/// counter += 1, counter < max, x / 2, 4 * x2, coef - _, x2 | 1, y / _, y - coef, x += inc
pub const INOPS_PER_ITERATION: u32 = 9;

/// Single precision has a 24 bit significand; past ~16.7M a float counter
/// stops growing and the loop never ends.
pub const FLT32_MAX_ITERATIONS: u64 = 16_000_000;

/// Numeric width of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    Bits32,
    Bits64,
}

/// Operation class of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpClass {
    Floating,
    Integer,
}

/// Workload kernel selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kernel {
    Flt32,
    Flt64,
    Int32,
    Int64,
}

impl Kernel {
    pub const ALL: [Kernel; 4] = [Kernel::Flt32, Kernel::Flt64, Kernel::Int32, Kernel::Int64];

    pub fn new(precision: Precision, class: OpClass) -> Self {
        match (precision, class) {
            (Precision::Bits32, OpClass::Floating) => Kernel::Flt32,
            (Precision::Bits64, OpClass::Floating) => Kernel::Flt64,
            (Precision::Bits32, OpClass::Integer) => Kernel::Int32,
            (Precision::Bits64, OpClass::Integer) => Kernel::Int64,
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            Kernel::Flt32 | Kernel::Int32 => Precision::Bits32,
            Kernel::Flt64 | Kernel::Int64 => Precision::Bits64,
        }
    }

    pub fn class(self) -> OpClass {
        match self {
            Kernel::Flt32 | Kernel::Flt64 => OpClass::Floating,
            Kernel::Int32 | Kernel::Int64 => OpClass::Integer,
        }
    }

    pub fn ops_per_iteration(self) -> u32 {
        match self.class() {
            OpClass::Floating => FLOPS_PER_ITERATION,
            OpClass::Integer => INOPS_PER_ITERATION,
        }
    }

    /// Largest iteration count the kernel can execute, if bounded
    pub fn max_iterations(self) -> Option<u64> {
        match self {
            Kernel::Flt32 => Some(FLT32_MAX_ITERATIONS),
            _ => None,
        }
    }

    /// Fail fast when `iterations` exceeds the kernel's ceiling
    pub fn check_iterations(self, iterations: u64) -> Result<()> {
        match self.max_iterations() {
            Some(max) if iterations > max => Err(XopsError::OutOfRange(format!(
                "{} supports at most {} iterations, got {}",
                self, max, iterations
            ))),
            _ => Ok(()),
        }
    }

    /// Unit label for throughput of this kernel
    pub fn unit(self) -> &'static str {
        match self.class() {
            OpClass::Floating => "GFLOPS",
            OpClass::Integer => "GINOPS",
        }
    }

    /// Execute exactly `iterations` loop iterations.
    ///
    /// `stopwatch` runs only around the loop itself; setup is not measured.
    pub fn run(self, iterations: u32, stopwatch: &mut Stopwatch) -> Result<()> {
        self.check_iterations(iterations as u64)?;
        // The 32-bit integer loop counts in i32
        if self == Kernel::Int32 && iterations > i32::MAX as u32 {
            return Err(XopsError::OutOfRange(format!(
                "{} runs at most {} iterations per call, got {}",
                self,
                i32::MAX,
                iterations
            )));
        }
        if iterations == 0 {
            return Ok(());
        }

        // The sink keeps the result observable so the loop cannot be removed
        match self {
            Kernel::Flt32 => {
                black_box(flops_32(iterations, stopwatch));
            }
            Kernel::Flt64 => {
                black_box(flops_64(iterations, stopwatch));
            }
            Kernel::Int32 => {
                black_box(inops_32(iterations, stopwatch));
            }
            Kernel::Int64 => {
                black_box(inops_64(iterations, stopwatch));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kernel::Flt32 => "FLT32",
            Kernel::Flt64 => "FLT64",
            Kernel::Int32 => "INT32",
            Kernel::Int64 => "INT64",
        };
        f.write_str(name)
    }
}

// Rational approximation of cos(x) swept over [-pi, pi].
macro_rules! float_kernel {
    ($name:ident, $ty:ty, $pi:expr) => {
        #[inline(never)]
        fn $name(iterations: u32, stopwatch: &mut Stopwatch) -> $ty {
            let max = iterations as $ty;
            let increment: $ty = 1.0;
            let start_value: $ty = -$pi;
            let end_value: $ty = $pi;
            let pi2: $ty = $pi * $pi;
            let func_inc = (end_value - start_value) / max;

            let mut counter: $ty = 0.0;
            let mut x = start_value;
            let mut y: $ty = 0.0;

            stopwatch.start();
            // Keep in sync with FLOPS_PER_ITERATION
            while counter < max {
                counter += increment;
                let x2 = x * x;
                y = pi2 - 4.0 * x2;
                y /= pi2 + x2;
                x += func_inc;

                x = black_box(x);
                y = black_box(y);
            }
            stopwatch.stop();

            y
        }
    };
}

// Integer analogue of the float loop; arithmetic wraps and the divisor is
// forced odd so it can never be zero.
macro_rules! int_kernel {
    ($name:ident, $ty:ty, $uty:ty) => {
        #[inline(never)]
        fn $name(iterations: u32, stopwatch: &mut Stopwatch) -> $ty {
            let max = iterations as $ty;
            let increment: $ty = 1;
            let coef: $ty = 3;
            let func_inc = (<$uty>::MAX / iterations as $uty) as $ty;

            let mut counter: $ty = 0;
            let mut x = <$ty>::MIN;
            let mut y: $ty = 0;

            stopwatch.start();
            // Keep in sync with INOPS_PER_ITERATION
            while counter < max {
                counter += increment;
                let x2 = x / 2;
                y = coef.wrapping_sub(x2.wrapping_mul(4));
                y = y.wrapping_div(x2 | 1);
                y = y.wrapping_sub(coef);
                x = x.wrapping_add(func_inc);

                x = black_box(x);
                y = black_box(y);
            }
            stopwatch.stop();

            y
        }
    };
}

float_kernel!(flops_32, f32, std::f32::consts::PI);
float_kernel!(flops_64, f64, std::f64::consts::PI);
int_kernel!(inops_32, i32, u32);
int_kernel!(inops_64, i64, u64);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_kernel_selection() {
        assert_eq!(Kernel::new(Precision::Bits32, OpClass::Floating), Kernel::Flt32);
        assert_eq!(Kernel::new(Precision::Bits64, OpClass::Floating), Kernel::Flt64);
        assert_eq!(Kernel::new(Precision::Bits32, OpClass::Integer), Kernel::Int32);
        assert_eq!(Kernel::new(Precision::Bits64, OpClass::Integer), Kernel::Int64);

        for kernel in Kernel::ALL {
            assert_eq!(Kernel::new(kernel.precision(), kernel.class()), kernel);
        }
    }

    #[test]
    fn test_ops_per_iteration() {
        assert_eq!(Kernel::Flt32.ops_per_iteration(), FLOPS_PER_ITERATION);
        assert_eq!(Kernel::Flt64.ops_per_iteration(), FLOPS_PER_ITERATION);
        assert_eq!(Kernel::Int32.ops_per_iteration(), INOPS_PER_ITERATION);
        assert_eq!(Kernel::Int64.ops_per_iteration(), INOPS_PER_ITERATION);
    }

    #[test]
    fn test_flt32_ceiling() {
        assert!(Kernel::Flt32.check_iterations(FLT32_MAX_ITERATIONS).is_ok());
        match Kernel::Flt32.check_iterations(FLT32_MAX_ITERATIONS + 1) {
            Err(XopsError::OutOfRange(_)) => {}
            other => panic!("expected OutOfRange, got {:?}", other),
        }
        assert!(Kernel::Int32.check_iterations(u64::MAX).is_ok());
        assert!(Kernel::Flt64.check_iterations(u64::MAX).is_ok());
    }

    #[test]
    fn test_flt32_fails_before_running() {
        let mut sw = Stopwatch::new();
        let result = Kernel::Flt32.run(FLT32_MAX_ITERATIONS as u32 + 1, &mut sw);
        assert!(matches!(result, Err(XopsError::OutOfRange(_))));
        assert_eq!(sw.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_int32_call_limit() {
        let mut sw = Stopwatch::new();
        let result = Kernel::Int32.run(3_000_000_000, &mut sw);
        assert!(matches!(result, Err(XopsError::OutOfRange(_))));
        assert_eq!(sw.elapsed(), Duration::ZERO);

        let result = Kernel::Int32.run(i32::MAX as u32 + 1, &mut sw);
        assert!(matches!(result, Err(XopsError::OutOfRange(_))));

        // Totals above the per-call limit are fine; engines split them into blocks
        assert!(Kernel::Int32.check_iterations(3_000_000_000).is_ok());
    }

    #[test]
    fn test_zero_iterations_is_noop() {
        for kernel in Kernel::ALL {
            let mut sw = Stopwatch::new();
            kernel.run(0, &mut sw).unwrap();
            assert_eq!(sw.elapsed(), Duration::ZERO);
        }
    }

    #[test]
    fn test_all_kernels_measure_time() {
        for kernel in Kernel::ALL {
            let mut sw = Stopwatch::new();
            kernel.run(100_000, &mut sw).unwrap();
            assert!(sw.elapsed() > Duration::ZERO, "{} reported no time", kernel);
            assert!(!sw.is_running());
        }
    }

    #[test]
    fn test_integer_kernels_handle_single_iteration() {
        // func_inc is MAX / 1 here, the wrapping path must not panic
        let mut sw = Stopwatch::new();
        Kernel::Int32.run(1, &mut sw).unwrap();
        Kernel::Int64.run(1, &mut sw).unwrap();
    }

    #[test]
    fn test_units_and_names() {
        assert_eq!(Kernel::Flt32.unit(), "GFLOPS");
        assert_eq!(Kernel::Int64.unit(), "GINOPS");
        assert_eq!(Kernel::Int32.to_string(), "INT32");
        assert_eq!(Kernel::Flt64.to_string(), "FLT64");
    }
}
