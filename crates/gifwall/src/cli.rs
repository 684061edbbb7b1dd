use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "gifwall",
    author,
    version,
    about = "Infinitely panning wall of downloaded gifs behind a retro CRT filter"
)]
pub struct Cli {
    /// Base URL of the gif listing backend.
    #[arg(long, env = "GIFWALL_API", default_value = "http://localhost:3001")]
    pub api_base: String,

    /// Forward the backend's content-safety filter (`yes` or `no`).
    #[arg(long, value_name = "yes|no", value_parser = parse_toggle, default_value = "yes", action = clap::ArgAction::Set)]
    pub safe: bool,

    /// CRT post-processing filter (`no` disables it).
    #[arg(long, value_name = "yes|no", value_parser = parse_toggle, default_value = "yes", action = clap::ArgAction::Set)]
    pub shader: bool,

    /// Number of candidate URLs requested from the backend at startup.
    #[arg(long, value_name = "COUNT", default_value_t = 10_000)]
    pub count: usize,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "1280x720")]
    pub size: (u32, u32),

    /// Frame pacing target; the pan speed is tuned for 60.
    #[arg(long, value_name = "FPS", default_value_t = 60.0)]
    pub fps: f32,

    /// Seed for the layout and skip-policy draws (random when omitted).
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_toggle(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" => Ok(true),
        "no" | "off" | "false" => Ok(false),
        other => Err(format!("expected yes or no, got '{other}'")),
    }
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width in window size".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height in window size".to_string())?;
    if width == 0 || height == 0 {
        return Err("window size must be greater than zero".into());
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toggle_variants() {
        assert_eq!(parse_toggle("yes"), Ok(true));
        assert_eq!(parse_toggle("NO"), Ok(false));
        assert_eq!(parse_toggle(" off "), Ok(false));
        assert!(parse_toggle("maybe").is_err());
    }

    #[test]
    fn parses_window_sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("1920X1080"), Ok((1920, 1080)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
    }

    #[test]
    fn defaults_keep_the_filters_on() {
        let cli = Cli::parse_from(["gifwall"]);
        assert!(cli.safe);
        assert!(cli.shader);
        assert_eq!(cli.count, 10_000);
        assert_eq!(cli.size, (1280, 720));
    }

    #[test]
    fn shader_no_disables_the_filter() {
        let cli = Cli::parse_from(["gifwall", "--shader", "no", "--safe", "no"]);
        assert!(!cli.shader);
        assert!(!cli.safe);
    }
}
