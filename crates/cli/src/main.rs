fn main() {
    if let Err(e) = modelsync_cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
