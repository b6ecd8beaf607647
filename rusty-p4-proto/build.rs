fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protos = [
        "proto/p4/v1/p4runtime.proto",
        "proto/p4/config/v1/p4info.proto",
        "proto/p4/config/v1/p4types.proto",
        "proto/google/rpc/status.proto",
    ];
    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    let mut config = prost_build::Config::new();
    config.bytes(&["."]);

    tonic_build::configure()
        .build_server(true)
        .format(false)
        .compile_with_config(config, &protos, &["proto"])?;

    Ok(())
}
