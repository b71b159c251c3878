use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use evals::{
    evaluate_plan, parse_meals_str, reporter::FeedbackClient, run_suite, EvalContext, EvalReport,
};
use shared::domain::{DietPlanId, Goal};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Feedback collector to push scores to.
    #[arg(long, global = true)]
    report_url: Option<String>,
    #[arg(long, global = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scores a plan JSON file: a meal array, `{"meals": [...]}`, or a
    /// `plan_complete` event.
    Evaluate {
        file: String,
        #[arg(long, default_value_t = 2000.0)]
        calorie_target: f64,
        #[arg(long, default_value = "maintenance")]
        goal: Goal,
        /// Repeatable; each term is matched against names and ingredients.
        #[arg(long = "forbidden")]
        forbidden: Vec<String>,
    },
    /// Scores a saved plan against its owner's profile.
    EvaluateStored {
        #[arg(long, default_value = "sqlite://./data/diet_planner.db")]
        database_url: String,
        #[arg(long)]
        plan_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let (run_id, report) = match cli.command {
        Command::Evaluate {
            file,
            calorie_target,
            goal,
            forbidden,
        } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {file}"))?;
            let meals = parse_meals_str(&raw)?;
            let ctx = EvalContext {
                calorie_target,
                goal,
                forbidden_ingredients: forbidden,
            };
            info!(file = %file, meals = meals.len(), "evaluating plan file");
            (format!("file-{}", uuid::Uuid::new_v4()), run_suite(&meals, &ctx))
        }
        Command::EvaluateStored {
            database_url,
            plan_id,
        } => {
            let storage = Storage::new(&database_url).await?;
            let Some(plan) = storage.load_diet_plan(DietPlanId(plan_id)).await? else {
                bail!("diet plan {plan_id} not found");
            };
            let Some(owner) = storage.user_by_id(plan.user_id).await? else {
                bail!("owner of diet plan {plan_id} no longer exists");
            };
            let mut ctx = EvalContext::from_profile(&owner.profile);
            ctx.calorie_target = f64::from(plan.target_calories);
            (format!("plan-{plan_id}"), evaluate_plan(&plan, &ctx)?)
        }
    };

    print_report(&report);

    if let Some(url) = cli.report_url {
        let sent = FeedbackClient::new(url, cli.api_key)
            .report(&run_id, &report)
            .await?;
        println!("reported {sent} scores as run {run_id}");
    }

    Ok(())
}

fn print_report(report: &EvalReport) {
    for result in &report.results {
        println!("{:<22} {:.2}  {}", result.key, result.score, result.comment);
    }
    println!("{:<22} {:.2}", "mean", report.mean_score);
}
