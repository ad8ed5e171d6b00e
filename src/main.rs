use std::env;

use resilink::config::{self, get_config};
use resilink::runtime;
use resilink::system::logging::init_logging;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args: Vec<String> = env::args().collect();

    // `resilink init-config` 打印示例配置后退出
    if args.len() > 1 && args[1] == "init-config" {
        println!("{}", config::Config::generate_sample_config());
        return Ok(());
    }

    config::init_config();
    let config = get_config();

    // guard 必须活到 main 结束
    let _guard = init_logging(config);

    if let Err(e) = runtime::server::run().await {
        eprintln!("{}", e.format_colored());
        std::process::exit(1);
    }

    Ok(())
}
