//! # wirechat server
//!
//! Single binary, single global room. Edit the constants in `config.rs` to
//! change the port, TTL, or log path — no config files, no environment
//! variables, no CLI flags.

fn main() {
    env_logger::init();

    let config = wirechat::Config::default();
    let server = match wirechat::Server::bind(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to bind: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        eprintln!("server loop exited: {}", e);
        std::process::exit(1);
    }
}
