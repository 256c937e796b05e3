fn main() {
    if let Err(error) = pomodoro_rounds::run() {
        eprintln!("pomodoro-rounds: {error}");
        std::process::exit(1);
    }
}
