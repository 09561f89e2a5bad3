//! Command line configuration.
//!
//! Every option can also be supplied through the environment so the same
//! image works from a Helm job template or an interactive shell.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::{Error, Result};

/// Only command the cleaner supports today
pub const REMOVE_CRD_COMMAND: &str = "remove-crd";
/// Directory the blocker pod mounts its serving certificate into
pub const BLOCKER_CERT_DIR: &str = "/var/run/service-catalog-blocker";
/// Default directory for the admission webhook serving certificate
pub const WEBHOOK_CERT_DIR: &str = "/etc/webhook/certs";
/// Default HTTPS port for admission servers
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;
/// Default port for /healthz, /readyz and /metrics
pub const DEFAULT_HEALTHZ_PORT: u16 = 8080;
/// Base name for every object the write blocker creates
pub const DEFAULT_BLOCKER_NAME: &str = "service-catalog-blocker";

#[derive(Parser, Debug)]
#[command(name = "catalog-ops", version, about = "Service Catalog operational tooling")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the admission webhooks for all catalog resources
    Webhook(WebhookOptions),
    /// Remove catalog CRDs and finalizers during uninstall
    Cleaner(CleanerOptions),
    /// Back up or restore catalog resources, or serve the write blocker
    Migration(MigrationOptions),
    /// Print the catalog CustomResourceDefinitions as YAML
    Crdgen(CrdgenOptions),
}

/// TLS serving options shared by the admission and blocker servers.
#[derive(Args, Debug, Clone)]
pub struct ServingOptions {
    /// HTTPS port of the admission server
    #[arg(long, env = "WEBHOOK_PORT", default_value_t = DEFAULT_WEBHOOK_PORT)]
    pub port: u16,

    /// Port of the health and metrics server
    #[arg(long, env = "HEALTHZ_PORT", default_value_t = DEFAULT_HEALTHZ_PORT)]
    pub healthz_port: u16,
}

impl ServingOptions {
    pub fn validate(&self) -> Result<()> {
        if self.port == self.healthz_port {
            return Err(Error::Config(format!(
                "webhook port and healthz port must differ, both are {}",
                self.port
            )));
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct WebhookOptions {
    #[command(flatten)]
    pub serving: ServingOptions,

    /// Directory containing tls.crt and tls.key
    #[arg(long, env = "WEBHOOK_CERT_DIR", default_value = WEBHOOK_CERT_DIR)]
    pub cert_dir: PathBuf,

    /// Helm release the CRDs are labelled with; enables the CRD readiness probe
    #[arg(long, env = "RELEASE_NAME")]
    pub release_name: Option<String>,

    /// Record the requesting user on ServiceInstances and ServiceBindings
    #[arg(long, env = "ORIGINATING_IDENTITY", default_value_t = false)]
    pub originating_identity: bool,
}

impl WebhookOptions {
    pub fn validate(&self) -> Result<()> {
        self.serving.validate()
    }
}

#[derive(Args, Debug, Clone)]
pub struct CleanerOptions {
    /// Command name to execute
    #[arg(long = "cleaner-command", env = "CLEANER_COMMAND", default_value = REMOVE_CRD_COMMAND)]
    pub command: String,

    /// Name of the Service Catalog Helm release
    #[arg(long, env = "RELEASE_NAME", default_value = "")]
    pub release_name: String,

    /// Namespace Service Catalog is released into
    #[arg(long, env = "SERVICE_CATALOG_NAMESPACE", default_value = "")]
    pub service_catalog_namespace: String,

    /// Name of the controller-manager Deployment
    #[arg(long, env = "CONTROLLER_MANAGER_DEPLOYMENT", default_value = "")]
    pub controller_manager_deployment: String,
}

impl CleanerOptions {
    /// Check the command is supported and all of its parameters are set.
    pub fn validate(&self) -> Result<()> {
        if self.command != REMOVE_CRD_COMMAND {
            return Err(Error::Config(format!(
                "Command {:?} is not supported",
                self.command
            )));
        }

        let parameters = [
            ("release-name", &self.release_name),
            ("service-catalog-namespace", &self.service_catalog_namespace),
            (
                "controller-manager-deployment",
                &self.controller_manager_deployment,
            ),
        ];
        if let Some((flag, _)) = parameters.iter().find(|(_, value)| value.is_empty()) {
            return Err(Error::Config(format!(
                "command {:?} requires three parameters, one of them ({:?}) is empty",
                REMOVE_CRD_COMMAND, flag
            )));
        }
        Ok(())
    }
}

/// What a migration run does.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationAction {
    /// Save every catalog resource to disk and remove it from the cluster
    Backup,
    /// Recreate catalog resources from a previous backup
    Restore,
    /// Serve the write blocker (runs inside the blocker pod)
    StartWebhookServer,
}

#[derive(Args, Debug, Clone)]
pub struct MigrationOptions {
    /// Action to perform
    #[arg(long, env = "ACTION", value_enum)]
    pub action: MigrationAction,

    /// Directory backups are written to and read from
    #[arg(long, env = "STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Namespace Service Catalog is released into
    #[arg(long, env = "SERVICE_CATALOG_NAMESPACE", default_value = "")]
    pub service_catalog_namespace: String,

    /// Name of the controller-manager Deployment
    #[arg(long, env = "CONTROLLER_MANAGER_DEPLOYMENT", default_value = "")]
    pub controller_manager_deployment: String,

    /// Deploy the write blocker for the duration of the backup
    #[arg(long, env = "ENABLE_BLOCKER", default_value_t = true, action = clap::ArgAction::Set)]
    pub enable_blocker: bool,

    /// Base name of the write blocker objects
    #[arg(long, env = "BLOCKER_NAME", default_value = DEFAULT_BLOCKER_NAME)]
    pub blocker_name: String,

    /// Image the blocker pod runs; must contain this binary
    #[arg(long, env = "BLOCKER_IMAGE", default_value = "")]
    pub blocker_image: String,

    /// Directory the blocker server reads tls.crt and tls.key from
    #[arg(long, env = "BLOCKER_CERT_DIR", default_value = BLOCKER_CERT_DIR)]
    pub cert_dir: PathBuf,

    #[command(flatten)]
    pub serving: ServingOptions,
}

impl MigrationOptions {
    pub fn validate(&self) -> Result<()> {
        match self.action {
            MigrationAction::Backup | MigrationAction::Restore => {
                if self.storage_path.is_none() {
                    return Err(Error::Config(format!(
                        "action {:?} requires --storage-path",
                        self.action
                    )));
                }
                let parameters = [
                    ("service-catalog-namespace", &self.service_catalog_namespace),
                    (
                        "controller-manager-deployment",
                        &self.controller_manager_deployment,
                    ),
                ];
                if let Some((flag, _)) = parameters.iter().find(|(_, value)| value.is_empty()) {
                    return Err(Error::Config(format!("parameter {:?} is empty", flag)));
                }
                if self.action == MigrationAction::Backup
                    && self.enable_blocker
                    && self.blocker_image.is_empty()
                {
                    return Err(Error::Config(
                        "the write blocker requires --blocker-image".to_string(),
                    ));
                }
                Ok(())
            }
            MigrationAction::StartWebhookServer => self.serving.validate(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CrdgenOptions {
    /// Label the CRDs with release=<name>
    #[arg(long, env = "RELEASE_NAME")]
    pub release_name: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn cleaner(command: &str, release: &str, namespace: &str, deployment: &str) -> CleanerOptions {
        CleanerOptions {
            command: command.to_string(),
            release_name: release.to_string(),
            service_catalog_namespace: namespace.to_string(),
            controller_manager_deployment: deployment.to_string(),
        }
    }

    #[test]
    fn test_cleaner_options_valid() {
        assert!(
            cleaner("remove-crd", "catalog", "catalog", "catalog-controller-manager")
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_cleaner_unsupported_command() {
        let err = cleaner("purge", "catalog", "catalog", "cm")
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Command \"purge\" is not supported");
    }

    #[test]
    fn test_cleaner_empty_parameter_is_named() {
        let err = cleaner("remove-crd", "catalog", "", "cm")
            .validate()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "command \"remove-crd\" requires three parameters, one of them (\"service-catalog-namespace\") is empty"
        );
    }

    #[test]
    fn test_cli_parses_migration_backup() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "migration",
            "--action",
            "backup",
            "--storage-path",
            "/tmp/backup",
            "--service-catalog-namespace",
            "catalog",
            "--controller-manager-deployment",
            "catalog-controller-manager",
            "--blocker-image",
            "catalog-ops:latest",
        ])
        .unwrap();

        let Command::Migration(opts) = cli.command else {
            panic!("expected migration subcommand");
        };
        assert_eq!(opts.action, MigrationAction::Backup);
        assert!(opts.enable_blocker);
        assert_eq!(opts.blocker_name, DEFAULT_BLOCKER_NAME);
        assert_eq!(opts.serving.port, DEFAULT_WEBHOOK_PORT);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_cli_rejects_unknown_action() {
        let result = Cli::try_parse_from(["catalog-ops", "migration", "--action", "upgrade"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_migration_backup_requires_storage_path() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "migration",
            "--action",
            "restore",
            "--service-catalog-namespace",
            "catalog",
            "--controller-manager-deployment",
            "cm",
        ])
        .unwrap();
        let Command::Migration(opts) = cli.command else {
            panic!("expected migration subcommand");
        };
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("--storage-path"));
    }

    #[test]
    fn test_blocker_server_uses_blocker_cert_dir() {
        let cli = Cli::try_parse_from([
            "catalog-ops",
            "migration",
            "--action",
            "start-webhook-server",
        ])
        .unwrap();
        let Command::Migration(opts) = cli.command else {
            panic!("expected migration subcommand");
        };
        assert_eq!(opts.action, MigrationAction::StartWebhookServer);
        assert_eq!(opts.cert_dir, PathBuf::from(BLOCKER_CERT_DIR));
        assert_eq!(opts.serving.healthz_port, DEFAULT_HEALTHZ_PORT);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_webhook_defaults() {
        let cli = Cli::try_parse_from(["catalog-ops", "webhook"]).unwrap();
        let Command::Webhook(opts) = cli.command else {
            panic!("expected webhook subcommand");
        };
        assert!(!opts.originating_identity);
        assert!(opts.release_name.is_none());
        assert_eq!(opts.cert_dir, PathBuf::from(WEBHOOK_CERT_DIR));
    }
}
