use std::env;
use std::fs;
use std::path::PathBuf;

// The protocol is compiled from proto/deviceplugin.proto. When a protoc binary
// is available (PROTOC set or on PATH), regenerate from the .proto so the
// checked-in output stays authoritative. When it is not (offline/hermetic
// builds), fall back to the pre-generated copy under src/generated so the build
// still succeeds without protoc.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let generated = out_dir.join("deviceplugin.rs");

    println!("cargo:rerun-if-changed=proto/deviceplugin.proto");
    println!("cargo:rerun-if-changed=proto");
    println!("cargo:rerun-if-changed=src/generated/deviceplugin.rs");
    println!("cargo:rerun-if-env-changed=PROTOC");

    match tonic_build::compile_protos("proto/deviceplugin.proto") {
        Ok(()) => Ok(()),
        Err(_) => {
            // protoc not found: use the pre-generated sources.
            let pregenerated = include_str!("src/generated/deviceplugin.rs");
            fs::write(&generated, pregenerated)?;
            Ok(())
        }
    }
}
