fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc unless the environment already provides one
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    println!("cargo:rerun-if-changed=proto/tfplugin6.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(false)
        .compile_protos(&["proto/tfplugin6.proto"], &["proto"])?;

    Ok(())
}
