use clap::Subcommand;
use goalgate_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the configuration as TOML
    Show,
    /// Set a config value
    Set {
        /// Config key (currently: fetch.timeout_secs)
        key: String,
        value: String,
    },
    /// Reset config to defaults
    Reset,
}

pub async fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            match key.as_str() {
                "fetch.timeout_secs" => config.fetch.timeout_secs = value.parse()?,
                other => return Err(format!("unknown key: {other}").into()),
            }
            config.save()?;
            println!("ok");
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}
