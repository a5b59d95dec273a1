fn main() {
    if let Err(e) = edututor_lib::run() {
        eprintln!("edututor: {}", e);
        std::process::exit(1);
    }
}
