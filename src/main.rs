fn main() {
    if let Err(err) = gridbase::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
