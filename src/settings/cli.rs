use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Authentication gateway in front of a GoTrue-compatible identity backend")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,
}
