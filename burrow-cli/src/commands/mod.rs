use crate::cli::Commands;
use anyhow::Result;

pub mod run;
pub mod stage;

/// Dispatch command to appropriate handler
pub fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run(args) => run::execute(args),

        Commands::NetworkNamespaceCreated { config } => stage::network_namespace_created(&config),

        Commands::ContainerNamespacesCreated { config, command } => {
            stage::container_namespaces_created(&config, &command)
        }
    }
}
