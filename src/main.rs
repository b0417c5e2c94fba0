use clap::Parser;
use pmp_admin_console::cli::{self, ingest, resources, workflow, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { global, command } = Cli::parse();
    let config = cli::init(&global);

    match command {
        Command::Validate(args) => workflow::validate_command(args),
        Command::References(args) => workflow::references_command(args),
        Command::AddStep(args) => workflow::add_step_command(&config, args).await,
        Command::Push(args) => workflow::push_command(&config, args).await,
        Command::StepOptions(args) => resources::step_options_command(&config, args).await,
        Command::Ingest(args) => ingest::run(&config, args).await,
        Command::List(args) => resources::list_command(&config, args).await,
        Command::Get(args) => resources::get_command(&config, args).await,
        Command::Create(args) => resources::create_command(&config, args).await,
        Command::Update(args) => resources::update_command(&config, args).await,
        Command::Delete(args) => resources::delete_command(&config, args).await,
        Command::Action(args) => resources::action_command(&config, args).await,
    }
}
