//! sanity CLI entry point

fn main() {
    sanity::cli::run();
}
