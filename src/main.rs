fn main() {
    std::process::exit(docket_scanner_lib::run())
}
