use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use vpn_chain::chain::{prepare_run, Chain, ChainResult, Host, SystemClock};
use vpn_chain::config::Settings;
use vpn_chain::openvpn::OpenVpnClient;
use vpn_chain::probe::{self, Prober, PublicIpService, ReachabilityCheck};
use vpn_chain::profile::collect_profiles;
use vpn_chain::secret::{passphrase, GpgDecryptor, SecretProvider};
use vpn_chain::vpn::hosts::read_extra_hosts;
use vpn_chain::vpn::HostsManager;

#[derive(Parser)]
#[command(name = "vpn-chain")]
#[command(about = "Bring up an ordered chain of OpenVPN tunnels with TOTP logins")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: ./vpn-chain.toml, then ~/.vpn-chain/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect every profile in order
    Connect {
        /// Profile descriptor directory or JSON list file
        #[arg(long)]
        profiles: Option<PathBuf>,
        /// Run reachability checks if every profile connects
        #[arg(long)]
        check: bool,
        /// Log the public IP before the chain and after each connection
        #[arg(long)]
        public_ip: bool,
        /// Prompt for the gpg passphrase instead of reading env/keyring
        #[arg(long)]
        ask_passphrase: bool,
    },
    /// Show the resolved connection order
    Profiles {
        #[arg(long)]
        profiles: Option<PathBuf>,
    },
    /// Run reachability checks only
    Check {
        #[arg(long)]
        targets: Option<PathBuf>,
    },
    /// Inject extra hosts entries into the hosts file
    Hosts {
        /// Remove the managed block instead
        #[arg(long)]
        remove: bool,
    },
    /// Generate default config file
    Init,
    /// Save the gpg passphrase in the OS keyring
    StorePassphrase,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = Settings::discover(cli.config.as_deref())?;
    vpn_chain::logging::init(cli.verbose, &settings.log)?;

    match cli.command {
        Commands::Connect {
            profiles,
            check,
            public_ip,
            ask_passphrase,
        } => {
            if let Some(source) = profiles {
                settings.paths.profiles = source;
            }
            if check {
                settings.chain.post_check = true;
            }
            if public_ip {
                settings.chain.public_ip_check = true;
            }

            let result = connect(settings, ask_passphrase).await?;
            print_summary(&result);
            if !result.all_succeeded() {
                std::process::exit(1);
            }
        }
        Commands::Profiles { profiles } => {
            let source = profiles.unwrap_or_else(|| settings.paths.profiles.clone());
            let (profiles, skipped) = collect_profiles(&source, &settings.paths);
            for (position, profile) in profiles.iter().enumerate() {
                println!(
                    "{:>3}. {} (order {}, user {}, {})",
                    position + 1,
                    profile.name,
                    profile.order,
                    profile.username.as_deref().unwrap_or("-"),
                    profile.connection_file.display()
                );
            }
            for err in &skipped {
                println!("  skipped: {}", err);
            }
        }
        Commands::Check { targets } => {
            let path = targets.unwrap_or_else(|| settings.paths.targets_file.clone());
            let targets = probe::load_targets(&path)?;
            let reports = Prober::new(probe::DEFAULT_TIMEOUT)?.run_all(targets).await;
            for report in &reports {
                match &report.result {
                    Ok(()) => println!("ok    {}", report.target),
                    Err(e) => println!("FAIL  {}: {}", report.target, e),
                }
            }
            if reports.iter().any(|r| !r.ok()) {
                std::process::exit(1);
            }
        }
        Commands::Hosts { remove } => {
            let manager = HostsManager::new(&settings.paths.hosts_file);
            if remove {
                manager.remove_entries()?;
                println!("Removed managed entries from {}", manager.path().display());
            } else {
                let lines = read_extra_hosts(&settings.paths.extra_hosts)?;
                manager.add_lines(&lines)?;
                println!("Added {} entries to {}", lines.len(), manager.path().display());
            }
        }
        Commands::Init => {
            info!("Generating default config...");
            let path = PathBuf::from("vpn-chain.toml");
            Settings::default().save(&path)?;
            println!("Created default config: {}", path.display());
        }
        Commands::StorePassphrase => {
            passphrase::store_in_keyring()?;
            println!("Passphrase stored in keyring");
        }
    }

    Ok(())
}

async fn connect(
    settings: Settings,
    ask_passphrase: bool,
) -> Result<ChainResult, Box<dyn std::error::Error>> {
    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root; openvpn may be unable to create tunnel devices");
    }

    let profiles = prepare_run(&settings)?;

    let passphrase = passphrase::resolve(&settings.secrets, ask_passphrase, |key| {
        std::env::var(key)
    })?;

    let host = Host {
        secrets: Arc::new(SecretProvider::new(
            GpgDecryptor::new(settings.secrets.gpg_binary.clone()),
            passphrase,
        )),
        network: Arc::from(vpn_chain::platform::get_network_inspector()?),
        client: Arc::new(OpenVpnClient::new(settings.openvpn.binary.clone())),
        clock: Arc::new(SystemClock),
    };
    let runtime = tokio::runtime::Handle::current();
    let ip_service = if settings.chain.public_ip_check {
        PublicIpService::new(
            &settings.chain.public_ip_url,
            probe::DEFAULT_TIMEOUT,
            runtime.clone(),
        )
        .map_err(|e| warn!("Public IP check disabled: {}", e))
        .ok()
    } else {
        None
    };

    // The chain blocks on process output and sleeps; keep it off the runtime
    let result = tokio::task::spawn_blocking(move || {
        let check = ReachabilityCheck::new(settings.paths.targets_file.clone(), runtime);
        let mut chain = Chain::new(&settings, &host).with_post_check(&check);
        if let Some(service) = &ip_service {
            chain = chain.with_ip_lookup(service);
        }
        chain.run(&profiles)
    })
    .await??;

    Ok(result)
}

fn print_summary(result: &ChainResult) {
    println!();
    for entry in &result.entries {
        match (&entry.outcome.interface, &entry.outcome.error) {
            (Some(interface), _) => println!("  up    {} on {}", entry.profile.name, interface),
            (None, Some(e)) => println!("  down  {}: {}", entry.profile.name, e),
            (None, None) => println!("  down  {}", entry.profile.name),
        }
    }
    if result.stopped_early {
        println!("  Chain stopped after the first failure");
    }
    println!(
        "{}/{} connected",
        result.succeeded(),
        result.entries.len()
    );
}
