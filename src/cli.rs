// Command-line interface

use crate::config::Config;
use crate::gateway;
use crate::row::{render, RowQueue, RowStateStore, StatusCheckJob};
use crate::service::AdminService;
use crate::update::VersionStatus;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pressdeck")]
#[command(about = "Detect, install and activate WordPress plugins from an organization's repositories")]
#[command(version)]
pub struct Cli {
    /// Path to config.toml (default: platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve {
        /// Bind address, overriding the configured one
        #[arg(long)]
        bind: Option<String>,
    },

    /// List the organization's repositories
    List {
        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long)]
        per_page: Option<usize>,

        /// Bypass the cached listing and forget row states
        #[arg(long)]
        refresh: bool,
    },

    /// Show the status of one repository
    Status {
        repo: String,
    },

    /// Check every repository on a page through the status queue
    Scan {
        #[arg(long, default_value = "1")]
        page: usize,
    },

    /// Install one or more repositories, one at a time
    Install {
        #[arg(required = true)]
        repos: Vec<String>,

        /// Activate each plugin after installing it
        #[arg(long)]
        activate: bool,
    },

    /// Activate an installed plugin by its plugin file (dir/file.php)
    Activate {
        plugin_file: String,
    },

    /// Drop the cached listing, detections and row states
    ClearCache,

    /// Compare this build with the published release
    CheckUpdate {
        /// Refetch the published version instead of using the cached one
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Default log filter for the `-v` count
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load(self.config.as_deref())?;
        if config.organization.is_empty() {
            anyhow::bail!(
                "No organization configured; set `organization` in config.toml or {}",
                crate::config::ORG_ENV_VAR
            );
        }
        let service = Arc::new(AdminService::from_config(&config)?);

        match self.command {
            Commands::Serve { bind } => {
                let mut gateway_config = config.gateway.clone();
                if let Some(bind) = bind {
                    gateway_config.bind = bind;
                }
                println!("✓ Serving {} on {}", service.organization(), gateway_config.bind);
                gateway::serve(service, &gateway_config).await?;
            }

            Commands::List {
                page,
                per_page,
                refresh,
            } => {
                if refresh {
                    clear_row_states(&config.state_dir, service.organization());
                }
                let listing = service.list_repositories(page, per_page, refresh).await?;
                for repo in &listing.repositories {
                    if repo.description.is_empty() {
                        println!("  {}", repo.name);
                    } else {
                        println!("  {} - {}", repo.name, repo.description);
                    }
                }
                let p = listing.pagination;
                println!(
                    "Page {}/{} ({} repositories)",
                    p.current_page,
                    p.total_pages.max(1),
                    p.total_items
                );
            }

            Commands::Status { repo } => {
                let status = service.get_row_status(&repo).await?;
                println!("{}", serde_json::to_string_pretty(&status)?);
            }

            Commands::Scan { page } => {
                let listing = service.list_repositories(page, None, false).await?;
                let store = Arc::new(RowStateStore::open(&config.state_dir, service.organization()));
                let job = Arc::new(StatusCheckJob::new(service.clone(), store.clone()));
                let queue = RowQueue::spawn(job, config.queue.check_delay());

                for repo in &listing.repositories {
                    queue.enqueue(&repo.name);
                }
                queue.wait_idle().await;

                for repo in &listing.repositories {
                    let view = render(&store.get(&repo.name));
                    let actions: Vec<&str> = view
                        .actions
                        .iter()
                        .filter(|a| a.is_enabled())
                        .map(|a| a.label())
                        .collect();
                    println!("  {:<40} {:<22} {}", repo.name, view.pill.label(), actions.join(", "));
                }
            }

            Commands::Install { repos, activate } => {
                let report = service.batch_install(&repos, activate).await?;
                for item in &report.results {
                    match (&item.data, &item.error) {
                        (Some(outcome), _) => {
                            for line in &outcome.logs {
                                println!("    {}", line);
                            }
                            println!("✓ {} installed as {}", item.repo_name, outcome.plugin_file);
                            if let Some(err) = &outcome.activation_error {
                                println!("  ! activation failed: {}", err);
                            }
                        }
                        (None, error) => {
                            println!("✗ {}: {}", item.repo_name, error.as_deref().unwrap_or("unknown error"));
                        }
                    }
                }
                let summary = report.summary;
                println!(
                    "{} of {} installed, {} failed",
                    summary.success, summary.total, summary.errors
                );
                if summary.errors > 0 {
                    anyhow::bail!("{} install(s) failed", summary.errors);
                }
            }

            Commands::Activate { plugin_file } => {
                let outcome = service.activate_plugin(&plugin_file)?;
                println!("✓ Activated {}", outcome.plugin_file);
            }

            Commands::ClearCache => {
                let report = service.clear_cache()?;
                clear_row_states(&config.state_dir, service.organization());
                println!(
                    "✓ Cache cleared (listing: {}, detections: {})",
                    if report.repositories { "removed" } else { "absent" },
                    report.detections
                );
            }

            Commands::CheckUpdate { force } => {
                let update = service.check_update(force).await;
                let remote = update.remote.as_deref().unwrap_or("?");
                match update.status {
                    VersionStatus::Older => {
                        println!("! Update available: {} -> {}", update.installed, remote)
                    }
                    VersionStatus::Equal => println!("✓ Up to date ({})", update.installed),
                    VersionStatus::Newer => {
                        println!("✓ Running {}, ahead of published {}", update.installed, remote)
                    }
                    VersionStatus::Unknown => println!(
                        "? Running {}; published version unknown: {}",
                        update.installed,
                        update.error.as_deref().unwrap_or("no answer")
                    ),
                }
            }
        }

        Ok(())
    }
}

/// Remove the persisted row states of `org`
fn clear_row_states(state_dir: &Path, org: &str) {
    RowStateStore::open(state_dir, org).clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowEvent;
    use tempfile::TempDir;

    #[test]
    fn parses_install_with_flags() {
        let cli = Cli::parse_from(["pressdeck", "-vv", "install", "seo", "forms", "--activate"]);
        assert_eq!(cli.log_level(), "debug");
        match cli.command {
            Commands::Install { repos, activate } => {
                assert_eq!(repos, ["seo", "forms"]);
                assert!(activate);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn install_requires_a_repository() {
        assert!(Cli::try_parse_from(["pressdeck", "install"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["pressdeck", "list", "--refresh", "--config", "/tmp/p.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
        assert_eq!(cli.log_level(), "warn");
        assert!(matches!(cli.command, Commands::List { refresh: true, page: 1, .. }));
    }

    #[test]
    fn parses_check_update() {
        let cli = Cli::parse_from(["pressdeck", "check-update", "--force"]);
        assert!(matches!(cli.command, Commands::CheckUpdate { force: true }));
    }

    #[test]
    fn clearing_row_states_removes_the_snapshot() {
        let dir = TempDir::new().unwrap();
        RowStateStore::open(dir.path(), "acme").apply_event("seo", RowEvent::CheckSuccessPlugin);
        RowStateStore::open(dir.path(), "other").apply_event("seo", RowEvent::CheckSuccessPlugin);
        assert!(RowStateStore::snapshot_path(dir.path(), "acme").exists());

        clear_row_states(dir.path(), "Acme");

        assert!(!RowStateStore::snapshot_path(dir.path(), "acme").exists());
        assert!(RowStateStore::snapshot_path(dir.path(), "other").exists());
        assert_eq!(
            RowStateStore::open(dir.path(), "acme").get("seo").fsm_state,
            crate::row::FsmState::Unknown
        );
    }
}
