use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    let proto_root = PathBuf::from("../proto");

    // Tell cargo to recompile if any proto files change
    println!("cargo:rerun-if-changed=../proto/pipeline/vector/v1/");
    println!("cargo:rerun-if-changed=../proto/pipeline/integration/v1/");

    // Compile vector service protos (client-side)
    tonic_build::configure()
        .build_server(false) // No server code in service-core
        .build_client(true) // Build clients for calling the vector service
        .compile_protos(
            &["../proto/pipeline/vector/v1/vector.proto"],
            &[&proto_root],
        )?;

    // Compile integration service protos (client-side)
    tonic_build::configure()
        .build_server(false)
        .build_client(true) // Build clients for fetching access tokens
        .compile_protos(
            &["../proto/pipeline/integration/v1/integration.proto"],
            &[&proto_root],
        )?;

    Ok(())
}
