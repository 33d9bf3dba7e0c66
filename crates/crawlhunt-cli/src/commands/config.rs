use clap::Subcommand;
use crawlhunt_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value by dotted key
    Get {
        /// Dotted config key (e.g. "geofence.max_regions", "sync.idle_timeout_secs")
        key: String,
    },
    /// Change one value and save
    Set {
        /// Dotted config key
        key: String,
        /// New value ("null" clears optional settings)
        value: String,
    },
    /// Print every dotted key with its current value
    Keys,
    /// Print the whole config as JSON
    List,
    /// Restore defaults (keeps the file if --yes is missing)
    Reset {
        /// Confirm overwriting the current config
        #[arg(long)]
        yes: bool,
    },
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key} (see `config keys`)");
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            let previous = config.get(&key);
            config.set(&key, &value)?;
            let current = config.get(&key).unwrap_or_default();
            match previous {
                Some(previous) if previous != current => println!("{key}: {previous} -> {current}"),
                _ => println!("{key}: {current}"),
            }
        }
        ConfigAction::Keys => {
            let config = Config::load()?;
            for (key, value) in config.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let json = serde_json::to_string_pretty(&config)?;
            println!("{json}");
        }
        ConfigAction::Reset { yes } => {
            let current = Config::load_or_default();
            let defaults = Config::default();
            let changed: Vec<String> = current
                .entries()
                .into_iter()
                .zip(defaults.entries())
                .filter(|(ours, default)| ours != default)
                .map(|((key, _), _)| key)
                .collect();

            if changed.is_empty() {
                println!("config already at defaults");
                return Ok(());
            }
            if !yes {
                eprintln!("would reset: {}", changed.join(", "));
                eprintln!("rerun with --yes to overwrite {}", Config::path()?.display());
                std::process::exit(1);
            }
            defaults.save()?;
            println!("reset {} key(s) to defaults", changed.len());
        }
        ConfigAction::Path => println!("{}", Config::path()?.display()),
    }
    Ok(())
}
