fn main() {
    gramarye::cli::run()
}
