//! axpath CLI
//!
//! Inspect and drive desktop applications through their accessibility trees.
//!
//! Usage:
//!   axpath tree 'app://com.apple.TextEdit' --depth 4
//!   axpath resolve 'app://com.apple.TextEdit/AXWindow[0]/AXButton[@AXTitle="Close"]'
//!   axpath click 'app://com.apple.TextEdit/AXWindow[0]/AXButton[@AXTitle="Close"]'
//!   axpath click 420,310 --double
//!   axpath activate-menu com.apple.TextEdit 'File > Export as PDF…'
//!   axpath exec '{"action":"press_key","key":"cmd+s"}'

use anyhow::{bail, Context, Result};
use axpath::element::ATTR_IDENTIFIER;
use axpath::{
    AccessibilityService, ActionRequest, ActionResult, ElementPath, Point, ScrollDirection,
    ServiceConfig, Target,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "axpath")]
#[command(about = "Path-addressed desktop automation over accessibility APIs")]
#[command(
    long_about = "axpath resolves hierarchical element paths against the live accessibility tree and performs actions on them, falling back from native actions to synthetic input."
)]
struct Cli {
    /// JSON configuration file, applied before AXPATH_* environment overrides
    #[clap(long, short = 'c', env = "AXPATH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(long, short = 'v', global = true)]
    verbose: bool,

    /// Print compact JSON instead of pretty-printed
    #[clap(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture the subtree at a path as JSON
    Tree {
        path: String,
        /// Maximum depth below the path's element
        #[clap(long, short = 'd')]
        depth: Option<usize>,
        /// Capture only the element itself
        #[clap(long)]
        flat: bool,
    },
    /// Resolve a path and describe the element it names
    Resolve { path: String },
    /// Run one JSON action request (reads stdin when REQUEST is '-')
    Exec { request: String },
    /// Click a path or an `x,y` screen position
    Click {
        target: String,
        #[clap(long, conflicts_with = "right")]
        double: bool,
        #[clap(long)]
        right: bool,
    },
    /// Type text into a path or an `x,y` screen position
    Type { target: String, text: String },
    /// Scroll a path or an `x,y` screen position
    Scroll {
        target: String,
        /// up, down, left or right
        direction: ScrollDirection,
        /// Fraction of a full scroll, 0 to 1
        #[clap(long, short = 'a', default_value_t = 0.3)]
        amount: f64,
    },
    /// Press a key combination such as `cmd+shift+s`
    Key {
        combo: String,
        /// Focus this path or position first
        #[clap(long, short = 't')]
        target: Option<String>,
    },
    /// List an application's top-level menus
    Menus { application: String },
    /// List the items of one top-level menu
    MenuItems { application: String, menu: String },
    /// Every menu path reachable without opening a menu
    MenuHierarchy { application: String },
    /// Activate a `File > Export > PDF` style menu path
    ActivateMenu { application: String, path: String },
    /// Report accessibility permission and tree health
    Health,
}

#[derive(Serialize)]
struct ResolvedElement {
    path: String,
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    actions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = ServiceConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    debug!(?config, "Loaded configuration");
    let mut service =
        AccessibilityService::new(config).context("Failed to start accessibility service")?;

    let output = run(&mut service, cli.command).await?;
    let rendered = if cli.compact {
        serde_json::to_string(&output)?
    } else {
        serde_json::to_string_pretty(&output)?
    };
    println!("{rendered}");
    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn run(service: &mut AccessibilityService, command: Commands) -> Result<serde_json::Value> {
    let value = match command {
        Commands::Tree { path, depth, flat } => {
            let path = parse_path(&path)?;
            let snapshot = service.snapshot(&path, !flat, depth)?;
            serde_json::to_value(snapshot.as_ref())?
        }
        Commands::Resolve { path } => {
            let path = parse_path(&path)?;
            let element = service.resolve(&path)?;
            serde_json::to_value(ResolvedElement {
                path: path.to_string(),
                role: element.role()?,
                title: element.title()?,
                identifier: element.string_attribute(ATTR_IDENTIFIER)?,
                actions: element.action_names()?,
            })?
        }
        Commands::Exec { request } => {
            let request = read_request(&request)?;
            info!("Executing {}", request.name());
            let response = service.execute(request).await;
            let value = serde_json::to_value(&response)?;
            if !response.success {
                println!("{}", serde_json::to_string_pretty(&value)?);
                bail!("Request failed: {}", value["error"]["message"]);
            }
            value
        }
        Commands::Click {
            target,
            double,
            right,
        } => {
            let target = parse_target(&target)?;
            let result = if double {
                service.double_click(&target).await?
            } else if right {
                service.right_click(&target).await?
            } else {
                service.click(&target).await?
            };
            result_json(&result)?
        }
        Commands::Type { target, text } => {
            let result = service.type_text(&parse_target(&target)?, &text).await?;
            result_json(&result)?
        }
        Commands::Scroll {
            target,
            direction,
            amount,
        } => {
            let result = service
                .scroll(&parse_target(&target)?, direction, amount)
                .await?;
            result_json(&result)?
        }
        Commands::Key { combo, target } => {
            let target = target.as_deref().map(parse_target).transpose()?;
            let result = service.press_key(target.as_ref(), &combo).await?;
            result_json(&result)?
        }
        Commands::Menus { application } => {
            serde_json::to_value(service.application_menus(&application)?)?
        }
        Commands::MenuItems { application, menu } => {
            serde_json::to_value(service.menu_items(&application, &menu).await?)?
        }
        Commands::MenuHierarchy { application } => {
            serde_json::to_value(service.menu_hierarchy(&application)?)?
        }
        Commands::ActivateMenu { application, path } => {
            result_json(&service.activate_menu(&application, &path).await?)?
        }
        Commands::Health => {
            let health = service.health_check();
            if !health.is_healthy() {
                info!("Health status: {:?}", health.status);
            }
            serde_json::to_value(health)?
        }
    };
    Ok(value)
}

fn result_json(result: &ActionResult) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(result)?)
}

fn parse_path(raw: &str) -> Result<ElementPath> {
    ElementPath::parse(raw).with_context(|| format!("Invalid element path '{raw}'"))
}

/// `x,y` is a screen position; anything else must be an element path.
fn parse_target(raw: &str) -> Result<Target> {
    if let Some(point) = parse_point(raw) {
        return Ok(Target::Position(point));
    }
    Ok(Target::Path(parse_path(raw)?))
}

fn parse_point(raw: &str) -> Option<Point> {
    let (x, y) = raw.split_once(',')?;
    let x = x.trim().parse::<f64>().ok()?;
    let y = y.trim().parse::<f64>().ok()?;
    Some(Point::new(x, y))
}

fn read_request(raw: &str) -> Result<ActionRequest> {
    let json = if raw == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        raw.to_string()
    };
    serde_json::from_str(&json).context("Request is not a valid action request")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_are_positions_or_paths() {
        assert!(matches!(
            parse_target("420, 310.5").unwrap(),
            Target::Position(p) if p == Point::new(420.0, 310.5)
        ));
        assert!(matches!(
            parse_target("app://com.example.App/AXWindow").unwrap(),
            Target::Path(_)
        ));
        assert!(parse_target("not a path").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "axpath",
            "scroll",
            "10,20",
            "down",
            "--amount",
            "0.5",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Scroll { direction: ScrollDirection::Down, amount, .. } if amount == 0.5
        ));

        assert!(Cli::try_parse_from(["axpath", "click", "1,1", "--double", "--right"]).is_err());
    }

    #[test]
    fn test_request_from_argument() {
        let request = read_request(r#"{ "action": "press_key", "key": "return" }"#).unwrap();
        assert_eq!(request.name(), "press_key");
        assert!(read_request("{}").is_err());
    }
}
