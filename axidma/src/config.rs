//! Driver configuration.
//!
//! The defaults come from `config.json` and are generated into the build output by the build
//! script. A platform overrides them by building its own [AxiDmaConfig].

use alloc::{boxed::Box, format, string::String};

mod build_config {
    include!(concat!(env!("OUT_DIR"), "/build_config.rs"));
}

pub use build_config::{CHRDEV_NAME, MINOR_NUMBER, NUM_DEVICES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxiDmaConfig {
    pub chrdev_name: Box<str>,
    pub minor_num: u32,
    pub num_devices: u32,
}

impl Default for AxiDmaConfig {
    fn default() -> Self {
        Self {
            chrdev_name: Box::from(CHRDEV_NAME),
            minor_num: MINOR_NUMBER,
            num_devices: NUM_DEVICES,
        }
    }
}

impl AxiDmaConfig {
    pub fn with_chrdev_name(mut self, name: &str) -> Self {
        self.chrdev_name = Box::from(name);
        self
    }

    pub fn with_minor_num(mut self, minor_num: u32) -> Self {
        self.minor_num = minor_num;
        self
    }

    /// Path of the character device node the access layer creates.
    pub fn device_path(&self) -> String {
        format!("/dev/{}", self.chrdev_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_build_config() {
        let config = AxiDmaConfig::default();
        assert_eq!(config.chrdev_name.as_ref(), "axidma");
        assert_eq!(config.minor_num, 0);
        assert_eq!(config.num_devices, 1);
        assert_eq!(config.device_path(), "/dev/axidma");
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = AxiDmaConfig::default()
            .with_chrdev_name("axidma1")
            .with_minor_num(4);
        assert_eq!(config.device_path(), "/dev/axidma1");
        assert_eq!(config.minor_num, 4);
    }
}
