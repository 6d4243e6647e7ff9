pub mod directory;
pub mod usb_copy;

pub use directory::DirectoryReader;
pub use usb_copy::UsbCopyReader;
