#[path = "integration/lifecycle.rs"]
mod lifecycle;
#[path = "integration/cli.rs"]
mod cli;
