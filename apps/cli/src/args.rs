use std::env;

#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    pub platform: Option<String>,
    pub plan: Option<String>,
    pub custom_limit_tokens: Option<u64>,
    pub custom_limit_cost: Option<f64>,
    pub refresh_rate: Option<u64>,
    pub timezone: Option<String>,
    pub reset_hour: Option<u8>,
    pub claude_dir: Option<String>,
    pub no_save: bool,
}

pub fn parse_args() -> Result<CliArgs, String> {
    let mut args = env::args().skip(1);
    let mut parsed = CliArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--platform" => {
                parsed.platform = Some(required(&mut args, "--platform")?);
            }
            "--plan" => {
                parsed.plan = Some(required(&mut args, "--plan")?);
            }
            "--custom-limit-tokens" => {
                let value = required(&mut args, "--custom-limit-tokens")?;
                let tokens = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid token limit: {value}"))?;
                parsed.custom_limit_tokens = Some(tokens);
            }
            "--custom-limit-cost" => {
                let value = required(&mut args, "--custom-limit-cost")?;
                let cost = value
                    .parse::<f64>()
                    .map_err(|_| format!("invalid cost limit: {value}"))?;
                parsed.custom_limit_cost = Some(cost);
            }
            "--refresh-rate" => {
                let value = required(&mut args, "--refresh-rate")?;
                let rate = value
                    .parse::<u64>()
                    .map_err(|_| format!("invalid refresh rate: {value}"))?;
                parsed.refresh_rate = Some(rate);
            }
            "--timezone" => {
                parsed.timezone = Some(required(&mut args, "--timezone")?);
            }
            "--reset-hour" => {
                let value = required(&mut args, "--reset-hour")?;
                let hour = value
                    .parse::<u8>()
                    .map_err(|_| format!("invalid reset hour: {value}"))?;
                parsed.reset_hour = Some(hour);
            }
            "--claude-dir" => {
                parsed.claude_dir = Some(required(&mut args, "--claude-dir")?);
            }
            "--no-save" => {
                parsed.no_save = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                return Err(format!("unknown argument: {arg}"));
            }
        }
    }

    Ok(parsed)
}

fn required(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("missing value for {flag}"))
}

pub fn print_help() {
    println!(
        "GenAI Usage Monitor\n\n\
Usage:\n  genai-monitor [options]\n\n\
Options:\n  \
--platform <codex|claude|all>   Providers to monitor (default: all)\n  \
--plan <name>                   free, payg, tier1, tier2, pro, max5, max20, custom\n  \
--custom-limit-tokens <n>       Pin the token limit (custom plan only)\n  \
--custom-limit-cost <usd>       Pin the cost limit (custom plan only)\n  \
--refresh-rate <seconds>        Tick period, 1-60 (default: 10)\n  \
--timezone <tz>                 Display timezone (default: UTC)\n  \
--reset-hour <0-23>             Hour at which daily views roll over\n  \
--claude-dir <path>             Override the Claude projects directory\n  \
--no-save                       Do not persist these flags to last_used.json\n  \
-h, --help                      Show this help message\n"
    );
}
