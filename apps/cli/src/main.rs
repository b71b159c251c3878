use std::{io::Write, path::PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use client_core::{DietPlanClient, Download};
use shared::{
    domain::{DietPlan, DietPlanId, Goal},
    protocol::{GenerateDietPlanRequest, ProfileUpdate, RegisterRequest, StreamEvent},
    validation::{password_strength, validate_password},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "diet-planner", about = "Command-line client for the diet planner API")]
struct Cli {
    #[arg(long, env = "DIET_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
    /// Bearer token printed by `login` or `register`.
    #[arg(long, env = "DIET_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DIET_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        goal: Option<Goal>,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "DIET_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Me,
    Plans,
    Show {
        id: i64,
    },
    /// Streams a new weekly plan, printing each day as it completes.
    Generate {
        #[arg(long)]
        name: Option<String>,
        /// Any date inside the target week.
        #[arg(long)]
        week_start: Option<NaiveDate>,
        #[arg(long)]
        preferences: Option<String>,
        #[arg(long)]
        calories: Option<u32>,
        #[arg(long)]
        no_save: bool,
        /// Wait for the whole plan instead of streaming progress.
        #[arg(long)]
        blocking: bool,
    },
    Rename {
        id: i64,
        name: String,
    },
    Delete {
        id: i64,
    },
    Pdf {
        id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Csv {
        id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Evaluate {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut client = DietPlanClient::new(&cli.server)?;
    if let Some(token) = cli.token {
        client = client.with_token(token);
    }

    match cli.command {
        Command::Register {
            email,
            password,
            first_name,
            last_name,
            goal,
        } => {
            validate_password(&password).map_err(anyhow::Error::msg)?;
            let strength = password_strength(&password);
            if strength.score < 3 {
                eprintln!(
                    "warning: password strength is {:?} ({}/4)",
                    strength.label, strength.score
                );
            }
            let profile = goal.map(|goal| ProfileUpdate {
                goal: Some(goal),
                ..ProfileUpdate::default()
            });
            let auth = client
                .register(&RegisterRequest {
                    email,
                    password,
                    first_name,
                    last_name,
                    profile,
                })
                .await?;
            eprintln!("registered user_id={}", auth.user.user_id.0);
            println!("{}", auth.token);
        }
        Command::Login { email, password } => {
            let auth = client.login(&email, &password).await?;
            eprintln!("logged in as {}", auth.user.email);
            println!("{}", auth.token);
        }
        Command::Me => {
            let profile = client.me().await?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        Command::Plans => {
            for plan in client.list_plans().await? {
                println!(
                    "{:>6}  {}  {}  ({} meals)",
                    plan.diet_plan_id.map_or(0, |id| id.0),
                    plan.week_start,
                    plan.name,
                    plan.meals.len()
                );
            }
        }
        Command::Show { id } => print_plan(&client.get_plan(DietPlanId(id)).await?),
        Command::Generate {
            name,
            week_start,
            preferences,
            calories,
            no_save,
            blocking,
        } => {
            let request = GenerateDietPlanRequest {
                name,
                week_start,
                preferences,
                target_calories: calories,
                save: !no_save,
            };
            let plan = if blocking {
                client.generate_plan(&request).await?
            } else {
                client
                    .generate_stream(&request, |event, progress| match event {
                        StreamEvent::Start { target_calories, .. } => {
                            eprintln!("generating at {target_calories} kcal/day");
                        }
                        StreamEvent::DayComplete { day, .. } => {
                            eprintln!("[{:>3}%] {} ready", progress.percent, day.label());
                        }
                        _ => {}
                    })
                    .await?
            };
            print_plan(&plan);
        }
        Command::Rename { id, name } => {
            let plan = client.rename_plan(DietPlanId(id), &name).await?;
            println!("renamed plan {id} to {}", plan.name);
        }
        Command::Delete { id } => {
            client.delete_plan(DietPlanId(id)).await?;
            println!("deleted plan {id}");
        }
        Command::Pdf { id, out } => {
            let download = client.download_pdf(DietPlanId(id)).await?;
            save(download, out)?;
        }
        Command::Csv { id, out } => {
            let download = client.export_csv(DietPlanId(id)).await?;
            save(download, out)?;
        }
        Command::Evaluate { id } => {
            let report = client.evaluate_plan(DietPlanId(id)).await?;
            for result in &report.results {
                println!("{:<22} {:.2}  {}", result.key, result.score, result.comment);
            }
            println!("{:<22} {:.2}", "mean", report.mean_score);
        }
    }

    Ok(())
}

fn print_plan(plan: &DietPlan) {
    let id = plan
        .diet_plan_id
        .map_or_else(|| "unsaved".to_string(), |id| id.0.to_string());
    println!(
        "{} [{id}] {} to {}, {} kcal/day",
        plan.name, plan.week_start, plan.week_end, plan.target_calories
    );
    let mut current = None;
    for meal in &plan.meals {
        if current != Some(meal.day) {
            current = Some(meal.day);
            println!("\n{}", meal.day.label());
        }
        println!(
            "  {:<10} {:<40} {:>5.0} kcal",
            meal.meal_type.label(),
            meal.name,
            meal.calories
        );
    }
}

fn save(download: Download, out: Option<PathBuf>) -> Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(&download.filename));
    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(&download.bytes)?;
    println!("wrote {} ({} bytes)", path.display(), download.bytes.len());
    Ok(())
}
