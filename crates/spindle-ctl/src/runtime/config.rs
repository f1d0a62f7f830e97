use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub bind_addr: String,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,
    pub profile_path: Option<PathBuf>,
    pub strategy: Option<String>,
    pub tick_ms: Option<u64>,
    pub telemetry_ms: u64,
    pub reject_dropouts: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            bind_addr: "127.0.0.1:7000".to_string(),
            json_logs: false,
            log_file: None,
            metrics_addr: None,
            profile_path: None,
            strategy: None,
            tick_ms: None,
            telemetry_ms: 500,
            reject_dropouts: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let mut cfg = RuntimeConfig::default();
        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--run-seconds" => {
                    if i + 1 < args.len() {
                        cfg.run_seconds = args[i + 1].parse::<u64>().ok();
                        i += 1;
                    }
                }
                "--bind" => {
                    if i + 1 < args.len() {
                        cfg.bind_addr = args[i + 1].clone();
                        i += 1;
                    }
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--log-file" => {
                    if i + 1 < args.len() {
                        cfg.log_file = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--metrics-addr" => {
                    if i + 1 < args.len() {
                        cfg.metrics_addr = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--profile" => {
                    if i + 1 < args.len() {
                        cfg.profile_path = Some(PathBuf::from(&args[i + 1]));
                        i += 1;
                    }
                }
                "--strategy" => {
                    if i + 1 < args.len() {
                        cfg.strategy = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--tick-ms" => {
                    if i + 1 < args.len() {
                        cfg.tick_ms = args[i + 1].parse::<u64>().ok().filter(|ms| *ms > 0);
                        i += 1;
                    }
                }
                "--telemetry-ms" => {
                    if i + 1 < args.len() {
                        cfg.telemetry_ms = args[i + 1].parse().unwrap_or(500);
                        i += 1;
                    }
                }
                "--reject-dropouts" => {
                    cfg.reject_dropouts = true;
                }
                "-h" | "--help" => {
                    cfg.show_help = true;
                }
                _ => {}
            }
            i += 1;
        }
        cfg
    }

    pub fn print_help() {
        println!(
            r#"spindle-ctl - remote-commanded motor speed controller

USAGE:
    spindle-ctl [OPTIONS]

OPTIONS:
    --bind <ADDR>           Client TCP bind address [default: 127.0.0.1:7000]
    --run-seconds <SECS>    Run for a fixed duration then exit
    --json-logs             Output logs in JSON format (for log aggregation)
    --log-file <PATH>       Also write logs to a file
    --metrics-addr <ADDR>   Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    --profile <PATH>        Load tuning profile from a JSON file
    --strategy <NAME>       Correction strategy (pid|hysteretic|feedforward) [default: pid]
    --tick-ms <MS>          Control tick period override [default: 1000]
    --telemetry-ms <MS>     Telemetry line interval [default: 500]
    --reject-dropouts       Discard zero tachometer readings while the motor is driven
    -h, --help              Print this help message

CLIENT COMMANDS:
    s start   x stop   c forward   v reverse   f faster   d slower
    a automatic   m manual   + raise target   - lower target   r:<rpm> set target

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,spindle_core=trace)

EXAMPLES:
    # Simulated rig with metrics
    spindle-ctl --metrics-addr 0.0.0.0:9090

    # Short test run with a faster loop
    spindle-ctl --run-seconds 10 --tick-ms 250 --telemetry-ms 100
"#
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("spindle-ctl")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_without_flags() {
        assert_eq!(RuntimeConfig::from_args(&args(&[])), RuntimeConfig::default());
    }

    #[test]
    fn parses_every_flag() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--bind",
            "0.0.0.0:7100",
            "--run-seconds",
            "3",
            "--json-logs",
            "--log-file",
            "/tmp/spindle.log",
            "--metrics-addr",
            "127.0.0.1:9090",
            "--profile",
            "rig.json",
            "--strategy",
            "hysteretic",
            "--tick-ms",
            "250",
            "--telemetry-ms",
            "100",
            "--reject-dropouts",
        ]));
        assert_eq!(cfg.bind_addr, "0.0.0.0:7100");
        assert_eq!(cfg.run_seconds, Some(3));
        assert!(cfg.json_logs);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/tmp/spindle.log")));
        assert_eq!(cfg.metrics_addr.as_deref(), Some("127.0.0.1:9090"));
        assert_eq!(cfg.profile_path, Some(PathBuf::from("rig.json")));
        assert_eq!(cfg.strategy.as_deref(), Some("hysteretic"));
        assert_eq!(cfg.tick_ms, Some(250));
        assert_eq!(cfg.telemetry_ms, 100);
        assert!(cfg.reject_dropouts);
        assert!(!cfg.show_help);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let cfg = RuntimeConfig::from_args(&args(&["--tick-ms", "0", "--telemetry-ms", "soon"]));
        assert_eq!(cfg.tick_ms, None);
        assert_eq!(cfg.telemetry_ms, 500);
    }

    #[test]
    fn help_flag() {
        assert!(RuntimeConfig::from_args(&args(&["-h"])).show_help);
        assert!(RuntimeConfig::from_args(&args(&["--help"])).show_help);
    }
}
