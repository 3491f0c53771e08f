/*++

Licensed under the Apache-2.0 license.

File Name:

    handoff.rs

Abstract:

    Application hand-off - Transfers control from the bootloader to the resident application

--*/

use crate::error::BootError;

/// Platform hooks for leaving the bootloader.
pub trait AppHandoff {
    /// Shuts down the radio/protocol stack so the application starts it afresh.
    fn disable_stack(&mut self) -> Result<(), BootError>;

    /// Masks every interrupt source.
    fn disable_interrupts(&mut self);

    /// Jumps to the application entry at `address`.
    fn jump(&mut self, address: u32) -> ! {
        jump_to(address)
    }
}

/// Transfers control to `address`. Never returns.
pub fn jump_to(address: u32) -> ! {
    log::info!("Jumping to application at {:#x}", address);

    #[cfg(target_arch = "riscv32")]
    unsafe {
        core::arch::asm!(
            "jr {0}",
            in(reg) address,
            options(noreturn)
        );
    }

    #[cfg(not(target_arch = "riscv32"))]
    panic!("Attempting to jump to application on non-RISC-V platform");
}
