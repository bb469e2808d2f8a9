//! Printing device interface and a PDF implementation of it.
//!
//! A print job driver walks its page model and calls a [`PrintingDevice`]
//! for every primitive; [`pdf::PdfPrintingDevice`] turns those calls into a
//! PDF file.

pub mod config;
pub mod device;
pub mod errors;
pub mod pdf;
pub mod platform;
pub mod types;


pub use config::PrinterConfig;
pub use device::PrintingDevice;
pub use errors::{PrinterError, Result};
pub use pdf::PdfPrintingDevice;
