//! Scoped flush-to-zero for the processing thread
//!
//! Long IIR tails decay into subnormal floats, which are very slow on most
//! CPUs. `ScopedNoDenormals` switches the current thread's FPU to
//! flush-to-zero / denormals-are-zero and restores the previous mode when
//! dropped, so every exit path of a block (including `?` and panics) leaves the
//! thread as it found it.

use std::marker::PhantomData;

/// RAII guard disabling subnormal arithmetic on the current thread
#[must_use = "denormals are re-enabled as soon as the guard is dropped"]
pub struct ScopedNoDenormals {
    previous: imp::Mode,
    // FPU control state is per thread, keep the guard on it
    _not_send: PhantomData<*const ()>,
}

impl ScopedNoDenormals {
    pub fn new() -> Self {
        let previous = imp::read();
        imp::write(imp::flush_to_zero(previous));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Whether this target supports switching the mode at all
    pub fn is_supported() -> bool {
        imp::SUPPORTED
    }
}

impl Default for ScopedNoDenormals {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedNoDenormals {
    fn drop(&mut self) {
        imp::write(self.previous);
    }
}

#[cfg(all(any(target_arch = "x86", target_arch = "x86_64"), target_feature = "sse"))]
mod imp {
    use std::arch::asm;

    pub type Mode = u32;
    pub const SUPPORTED: bool = true;

    // MXCSR bits
    const FLUSH_TO_ZERO: u32 = 1 << 15;
    const DENORMALS_ARE_ZERO: u32 = 1 << 6;

    pub fn flush_to_zero(mode: Mode) -> Mode {
        mode | FLUSH_TO_ZERO | DENORMALS_ARE_ZERO
    }

    pub fn read() -> Mode {
        let mut csr: u32 = 0;
        // SAFETY: stmxcsr only stores the control register into `csr`
        unsafe {
            asm!("stmxcsr [{}]", in(reg) &mut csr, options(nostack, preserves_flags));
        }
        csr
    }

    #[inline(never)]
    pub fn write(mode: Mode) {
        // SAFETY: only rounding / exception-mask / FTZ / DAZ bits are ever
        // written, all of which were read from the register itself
        unsafe {
            asm!("ldmxcsr [{}]", in(reg) &mode, options(nostack, readonly, preserves_flags));
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod imp {
    use std::arch::asm;

    pub type Mode = u64;
    pub const SUPPORTED: bool = true;

    // FPCR.FZ
    const FLUSH_TO_ZERO: u64 = 1 << 24;

    pub fn flush_to_zero(mode: Mode) -> Mode {
        mode | FLUSH_TO_ZERO
    }

    pub fn read() -> Mode {
        let fpcr: u64;
        // SAFETY: reading FPCR has no side effects
        unsafe {
            asm!("mrs {}, fpcr", out(reg) fpcr, options(nomem, nostack, preserves_flags));
        }
        fpcr
    }

    #[inline(never)]
    pub fn write(mode: Mode) {
        // SAFETY: the value originates from FPCR with only FZ changed
        unsafe {
            asm!("msr fpcr, {}", in(reg) mode, options(nostack, preserves_flags));
        }
    }
}

#[cfg(not(any(
    all(any(target_arch = "x86", target_arch = "x86_64"), target_feature = "sse"),
    target_arch = "aarch64"
)))]
mod imp {
    pub type Mode = ();
    pub const SUPPORTED: bool = false;

    pub fn flush_to_zero(mode: Mode) -> Mode {
        mode
    }

    pub fn read() -> Mode {}

    pub fn write(_mode: Mode) {}
}
