use std::env;
use std::path::PathBuf;

use cozip_huffman::{ArtifactFormat, CoZipHuffman, HuffmanOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Encode,
    Decode,
}

#[derive(Debug, Clone)]
struct CliConfig {
    intent: Intent,
    input: PathBuf,
    output: PathBuf,
    options: HuffmanOptions,
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let lowered = value.trim().to_ascii_lowercase();
            !(lowered.is_empty() || lowered == "0" || lowered == "false" || lowered == "off")
        }
        Err(_) => false,
    }
}

impl CliConfig {
    fn from_args() -> Result<Self, String> {
        let mut args = env::args().skip(1);
        let intent = match args.next().as_deref() {
            Some("encode") => Intent::Encode,
            Some("decode") => Intent::Decode,
            Some("--help") | Some("-h") | None => return Err(help_text()),
            Some(other) => return Err(format!("unknown intent: {}\n{}", other, help_text())),
        };
        let input = args
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| format!("missing input path\n{}", help_text()))?;
        let output = args
            .next()
            .map(PathBuf::from)
            .ok_or_else(|| format!("missing output path\n{}", help_text()))?;
        if let Some(extra) = args.next() {
            return Err(format!("unexpected argument: {}", extra));
        }

        let mut options = HuffmanOptions {
            profile_timing: env_flag("COZIP_HUFFMAN_PROFILE"),
            ..HuffmanOptions::default()
        };
        if let Ok(value) = env::var("COZIP_HUFFMAN_WORKERS") {
            options.worker_count = value
                .trim()
                .parse::<usize>()
                .map_err(|_| "invalid COZIP_HUFFMAN_WORKERS".to_string())?;
        }
        if env_flag("COZIP_HUFFMAN_LEGACY") {
            options.artifact_format = ArtifactFormat::Legacy;
        }

        Ok(Self {
            intent,
            input,
            output,
            options,
        })
    }
}

fn help_text() -> String {
    let text = r#"usage: cargo run --release -p cozip_huffman --example huffman_cli -- <encode|decode> <input> <output>
  env COZIP_HUFFMAN_WORKERS=<N>   worker threads (default: available parallelism)
  env COZIP_HUFFMAN_PROFILE=1     log per-phase timings
  env COZIP_HUFFMAN_LEGACY=1      write the headerless single-partition format"#;
    text.to_string()
}

fn main() {
    let config = match CliConfig::from_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(2);
        }
    };

    let codec = match CoZipHuffman::init(config.options.clone()) {
        Ok(codec) => codec,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let result = match config.intent {
        Intent::Encode => codec.encode_file_from_name(&config.input, &config.output),
        Intent::Decode => codec.decode_file_from_name(&config.input, &config.output),
    };

    match result {
        Ok(stats) => {
            println!(
                "{:?} {} -> {}: partitions={} symbols={} payload_bytes={} time_ms={}",
                config.intent,
                config.input.display(),
                config.output.display(),
                stats.partition_count,
                stats.symbol_count,
                stats.payload_bytes,
                stats.timing_label(),
            );
            // no log backend is installed here, so print the phases directly
            if config.options.profile_timing {
                eprintln!(
                    "[cozip-huffman][timing] prepare_ms={:.3} dispatch_ms={:.3}",
                    stats.prepare.as_secs_f64() * 1000.0,
                    stats.dispatch.as_secs_f64() * 1000.0,
                );
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
