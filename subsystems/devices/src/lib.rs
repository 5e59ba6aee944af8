//! # rvcore-devices
//!
//! Device interface contracts consumed by the machine orchestrator: a
//! character device (UART-style byte stream), a TAP network backend, a GPIO
//! bank, and an I2C bus participant. The reference these are modeled on
//! expresses each as a struct of function pointers plus opaque data; here
//! each is an object-safe trait so a concrete device is just a `dyn Trait`
//! the machine holds by `Arc`. This crate defines contracts only — no
//! concrete device model lives here, that is an embedder's job.

pub mod chardev;
pub mod gpio;
pub mod i2c;
pub mod irq;
pub mod tap;

pub use chardev::{CharDev, PollFlags};
pub use gpio::GpioDev;
pub use i2c::{I2cAddressPool, I2cDev};
pub use irq::IrqLine;
pub use tap::TapDev;
