use serde::Deserialize;
use std::{env, fs, path::PathBuf};

#[derive(Deserialize)]
struct BuildConfig {
    chrdev_name: String,
    minor_number: u32,
    num_devices: u32,
}

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let config_str =
        fs::read_to_string(PathBuf::from(manifest_dir.clone()).join("config.json")).unwrap();
    let config: BuildConfig = serde_json::from_str(&config_str).unwrap();
    if config.chrdev_name.is_empty() || config.chrdev_name.contains('/') {
        panic!("Invalid character device name {:?}.", config.chrdev_name);
    }
    if config.num_devices == 0 {
        panic!("At least one device must be configured.");
    }
    make_config(&config);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=config.json");
}

fn make_config(config: &BuildConfig) {
    let mut s = String::new();
    s += "/// Name of the character device exposed to the access layer.\n";
    s += format!("pub const CHRDEV_NAME: &str = {:?};\n", config.chrdev_name).as_str();
    s += "/// First minor number handed to the character device.\n";
    s += format!("pub const MINOR_NUMBER: u32 = {};\n", config.minor_number).as_str();
    s += "/// Number of device nodes to create.\n";
    s += format!("pub const NUM_DEVICES: u32 = {};\n", config.num_devices).as_str();
    let out_dir = env::var("OUT_DIR").unwrap();
    let path = PathBuf::from(out_dir).join("build_config.rs");
    fs::write(path, s).unwrap();
}
