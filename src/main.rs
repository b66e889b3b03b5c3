use fault_tolerant_ivy::cluster::{self, Cluster, Scenario};
use fault_tolerant_ivy::config::IvyConfig;
use std::io::{BufRead, Write};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config = IvyConfig::from_env()?;
    let mut scenario: Option<Scenario> = None;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                let value = args.get(i + 1).ok_or_else(|| usage(&args[0]))?;
                scenario = Some(value.parse()?);
                i += 2;
            }
            "--nodes" => {
                let value = args.get(i + 1).ok_or_else(|| usage(&args[0]))?;
                config.node_count = value.parse()?;
                i += 2;
            }
            "--pages" => {
                let value = args.get(i + 1).ok_or_else(|| usage(&args[0]))?;
                config.page_count = value.parse()?;
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }
    config.validate()?;

    println!("**************************************************");
    println!(" FAULT TOLERANT IVY PROTOCOL ");
    println!("**************************************************");
    println!("The network will have {} Nodes.", config.node_count);

    let scenario = match scenario {
        Some(scenario) => scenario,
        None => match prompt()? {
            Some(scenario) => scenario,
            None => return Ok(()),
        },
    };

    let mut cluster = Cluster::start(&config)?;
    let report = cluster::benchmark::run(&mut cluster, scenario).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    cluster.shutdown().await;
    Ok(())
}

fn usage(program: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Usage: {} [--scenario <1-4|name>] [--nodes <n>] [--pages <n>] [--json]",
        program
    )
}

/// Asks for a scenario on stdin until a valid one or `EXIT` is entered.
fn prompt() -> anyhow::Result<Option<Scenario>> {
    println!();
    println!("Instructions:");
    for (n, scenario) in Scenario::ALL.iter().enumerate() {
        println!("Type {} to Simulate {}", n + 1, scenario.title());
    }
    println!("or Type EXIT to exit:");
    std::io::stdout().flush()?;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("EXIT") {
            return Ok(None);
        }
        match input.parse::<Scenario>() {
            Ok(scenario) => return Ok(Some(scenario)),
            Err(e) => eprintln!("{}", e),
        }
    }

    Ok(None)
}
