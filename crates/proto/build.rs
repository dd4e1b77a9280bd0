//! 编译 proto/discount.proto，生成 gRPC 服务端与客户端代码

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/discount.proto");

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/discount.proto"], &["proto"])?;

    Ok(())
}
