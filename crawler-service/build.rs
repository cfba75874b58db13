fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?);

    // Compile crawler service protos with file descriptor set for reflection
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("crawler_descriptor.bin"))
        .compile_protos(
            &["../proto/pipeline/crawler/v1/crawler.proto"],
            &["../proto"],
        )?;

    println!("cargo:rerun-if-changed=../proto/pipeline/crawler/v1/crawler.proto");

    Ok(())
}
