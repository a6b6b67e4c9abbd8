//! Casefile CLI - command line interface for document storage.
//!
//! Manages cloud credentials, stores versioned documents locally or in S3,
//! and invokes hosted text-generation models.

mod settings;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use casefile_cloud::{
    validate_bedrock, validate_s3, BedrockConfiguration, CredentialFields, CredentialStore,
    S3Configuration, DEFAULT_REGION,
};
use casefile_common::DocumentId;
use casefile_documents::{DocumentService, DocumentStatus, DocumentStore, NewDocument};
use casefile_inference::{InferenceClient, InferenceParameters};
use casefile_storage::DocumentStorage;
use settings::Settings;

#[derive(Parser)]
#[command(name = "casefile")]
#[command(about = "Casefile - Legal document storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Settings file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage S3 storage configurations.
    #[command(subcommand)]
    S3(S3Command),

    /// Manage Bedrock configurations.
    #[command(subcommand)]
    Bedrock(BedrockCommand),

    /// Manage documents and their versions.
    #[command(subcommand)]
    Doc(DocCommand),

    /// Generate text with a Bedrock model.
    Invoke {
        /// Prompt text.
        #[arg(short, long)]
        prompt: String,

        /// Model id (default: the active configuration's model).
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long, default_value_t = 500)]
        max_tokens: u32,

        #[arg(long, default_value_t = 0.7)]
        temperature: f64,

        #[arg(long, default_value_t = 0.9)]
        top_p: f64,
    },
}

/// Key pair and common fields of a credential configuration.
#[derive(Args)]
struct CredentialArgs {
    /// Friendly name for the configuration.
    #[arg(short, long)]
    name: String,

    /// AWS access key id.
    #[arg(long)]
    access_key_id: String,

    /// AWS secret access key (prompted for when omitted).
    #[arg(long, env = "CASEFILE_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    /// AWS region.
    #[arg(short, long, default_value = DEFAULT_REGION)]
    region: String,

    /// Save the configuration as inactive.
    #[arg(long)]
    inactive: bool,
}

#[derive(Subcommand)]
enum S3Command {
    /// Add an S3 configuration.
    Add {
        #[command(flatten)]
        credentials: CredentialArgs,

        /// Bucket name.
        #[arg(short, long)]
        bucket: String,

        /// Use this bucket for documents.
        #[arg(long)]
        media: bool,

        /// Use this bucket for static files.
        #[arg(long = "static")]
        static_files: bool,

        /// Create the bucket during validation if it does not exist.
        #[arg(long)]
        create_bucket: bool,

        /// Custom domain serving the bucket.
        #[arg(long)]
        custom_domain: Option<String>,
    },

    /// List S3 configurations.
    List,

    /// Remove an S3 configuration.
    Remove { id: i64 },

    /// Check credentials and bucket access.
    Validate { id: i64 },
}

#[derive(Subcommand)]
enum BedrockCommand {
    /// Add a Bedrock configuration.
    Add {
        #[command(flatten)]
        credentials: CredentialArgs,

        /// Default model id.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List Bedrock configurations.
    List,

    /// Remove a Bedrock configuration.
    Remove { id: i64 },

    /// Check credentials and region support.
    Validate { id: i64 },

    /// List foundation models offered in the configuration's region.
    Models {
        /// Configuration id; the active one when omitted.
        id: Option<i64>,
    },
}

#[derive(Subcommand)]
enum DocCommand {
    /// Create a document.
    Create {
        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated tags.
        #[arg(long, default_value = "")]
        tags: String,

        /// draft, under_review, approved or archived.
        #[arg(short, long, default_value = "draft")]
        status: String,

        /// Store objects without a private ACL.
        #[arg(long)]
        public: bool,
    },

    /// List documents.
    List,

    /// Upload a file as the next version of a document.
    Upload {
        document: String,

        file: PathBuf,

        /// Notes about this version.
        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// List versions of a document.
    Versions { document: String },

    /// Print an access URL for a version.
    Url {
        document: String,

        /// Version number (default: current).
        #[arg(short = 'V', long)]
        version: Option<u32>,

        /// URL lifetime in seconds.
        #[arg(short, long)]
        expires: Option<u64>,
    },

    /// Download a version to a file.
    Download {
        document: String,

        /// Version number (default: current).
        #[arg(short = 'V', long)]
        version: Option<u32>,

        /// Output file (default: the version's file name).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete one version and its stored file.
    RmVersion { document: String, version: u32 },

    /// Delete a document, all versions and stored files.
    Rm { document: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::load(cli.config.as_deref())?;
    settings.ensure_dirs()?;
    let credentials = CredentialStore::open(&settings.database_path)
        .context("Failed to open credential store")?;

    match cli.command {
        Commands::S3(command) => cmd_s3(&credentials, command).await,
        Commands::Bedrock(command) => cmd_bedrock(&credentials, command).await,
        Commands::Doc(command) => cmd_doc(&settings, &credentials, command).await,
        Commands::Invoke {
            prompt,
            model,
            max_tokens,
            temperature,
            top_p,
        } => {
            let params = InferenceParameters {
                max_tokens,
                temperature,
                top_p,
            };
            cmd_invoke(&credentials, &prompt, model.as_deref(), &params).await
        }
    }
}

/// Read the secret from the flag/env or prompt for it.
fn secret_from(args: &CredentialArgs) -> Result<String> {
    match &args.secret_access_key {
        Some(secret) => Ok(secret.clone()),
        None => rpassword::prompt_password("AWS secret access key: ")
            .context("Failed to read secret access key"),
    }
}

fn credential_fields(args: &CredentialArgs) -> Result<CredentialFields> {
    Ok(
        CredentialFields::new(&args.name, &args.access_key_id, secret_from(args)?)
            .with_region(&args.region)
            .with_active(!args.inactive),
    )
}

fn active_label(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}

async fn cmd_s3(store: &CredentialStore, command: S3Command) -> Result<()> {
    match command {
        S3Command::Add {
            credentials,
            bucket,
            media,
            static_files,
            create_bucket,
            custom_domain,
        } => {
            let mut config = S3Configuration::new(credential_fields(&credentials)?, bucket);
            config.use_for_media_files = media;
            config.use_for_static_files = static_files;
            config.create_bucket_if_not_exists = create_bucket;
            config.custom_domain = custom_domain;

            let id = store.save_s3(&mut config).context("Failed to save S3 configuration")?;
            println!("S3 configuration saved (id {})", id);
        }
        S3Command::List => {
            let configs = store.list_s3()?;
            if configs.is_empty() {
                println!("No S3 configurations.");
            }
            for config in configs {
                let mut purposes = Vec::new();
                if config.use_for_media_files {
                    purposes.push("media");
                }
                if config.use_for_static_files {
                    purposes.push("static");
                }
                println!(
                    "  {:>4}  {} [{}] bucket={} region={} uses={}",
                    config.id.unwrap_or_default(),
                    config.credentials.name,
                    active_label(config.credentials.is_active),
                    config.bucket_name,
                    config.credentials.region,
                    if purposes.is_empty() { "-".to_string() } else { purposes.join(",") }
                );
            }
        }
        S3Command::Remove { id } => {
            if !store.delete_s3(id)? {
                anyhow::bail!("S3 configuration {} not found", id);
            }
            println!("S3 configuration {} removed", id);
        }
        S3Command::Validate { id } => {
            let config = store
                .get_s3(id)?
                .with_context(|| format!("S3 configuration {} not found", id))?;
            match validate_s3(&config).await {
                Ok(message) => println!("{}", message),
                Err(e) => anyhow::bail!("Validation failed: {}", e),
            }
        }
    }
    Ok(())
}

async fn cmd_bedrock(store: &CredentialStore, command: BedrockCommand) -> Result<()> {
    match command {
        BedrockCommand::Add { credentials, model } => {
            let mut config = BedrockConfiguration::new(credential_fields(&credentials)?);
            if let Some(model) = model {
                config = config.with_model(model);
            }
            let id = store
                .save_bedrock(&mut config)
                .context("Failed to save Bedrock configuration")?;
            println!("Bedrock configuration saved (id {})", id);
        }
        BedrockCommand::List => {
            let configs = store.list_bedrock()?;
            if configs.is_empty() {
                println!("No Bedrock configurations.");
            }
            for config in configs {
                println!(
                    "  {:>4}  {} [{}] region={} model={}",
                    config.id.unwrap_or_default(),
                    config.credentials.name,
                    active_label(config.credentials.is_active),
                    config.credentials.region,
                    config.default_model_id
                );
            }
        }
        BedrockCommand::Remove { id } => {
            if !store.delete_bedrock(id)? {
                anyhow::bail!("Bedrock configuration {} not found", id);
            }
            println!("Bedrock configuration {} removed", id);
        }
        BedrockCommand::Validate { id } => {
            let config = store
                .get_bedrock(id)?
                .with_context(|| format!("Bedrock configuration {} not found", id))?;
            match validate_bedrock(&config).await {
                Ok(message) => println!("{}", message),
                Err(e) => anyhow::bail!("Validation failed: {}", e),
            }
        }
        BedrockCommand::Models { id } => {
            let client = match id {
                Some(id) => {
                    let config = store
                        .get_bedrock(id)?
                        .with_context(|| format!("Bedrock configuration {} not found", id))?;
                    InferenceClient::from_config(&config)?
                }
                None => InferenceClient::from_store(store)?,
            };
            if !client.is_available() {
                anyhow::bail!("No Bedrock client available - check configuration");
            }
            let models = client.list_available_models().await;
            if models.is_empty() {
                println!("No models available.");
            }
            for model in models {
                println!("  {}", model);
            }
        }
    }
    Ok(())
}

fn parse_document(id: &str) -> Result<DocumentId> {
    id.parse().context("Invalid document id")
}

async fn cmd_doc(settings: &Settings, credentials: &CredentialStore, command: DocCommand) -> Result<()> {
    let storage = DocumentStorage::from_store(credentials, settings.storage.clone())
        .context("Failed to set up document storage")?;
    let store = DocumentStore::open(&settings.database_path).context("Failed to open document store")?;
    let service = DocumentService::new(store, storage);

    match command {
        DocCommand::Create {
            title,
            description,
            tags,
            status,
            public,
        } => {
            let status: DocumentStatus = status.parse()?;
            let document = service.create_document(
                &NewDocument::new(title)
                    .with_description(description)
                    .with_tags(tags)
                    .with_status(status)
                    .with_private(!public),
            )?;
            println!("Document created: {}", document.uuid);
        }
        DocCommand::List => {
            let documents = service.list_documents()?;
            if documents.is_empty() {
                println!("No documents.");
            }
            for document in documents {
                println!(
                    "  {}  {} [{}] v{} {}",
                    document.uuid,
                    document.title,
                    document.status,
                    document.version_counter,
                    document.tag_list().join(", ")
                );
            }
        }
        DocCommand::Upload {
            document,
            file,
            notes,
        } => {
            let document = parse_document(&document)?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let file_name = file_name_of(&file)?;

            let version = service
                .upload_version(&document, &file_name, data, &notes)
                .await
                .context("Failed to upload document")?;
            println!(
                "Uploaded {} as version {} ({} bytes, {} storage)",
                version.file_name,
                version.sequence,
                version.file_size,
                service.storage().backend_name()
            );
        }
        DocCommand::Versions { document } => {
            let document = parse_document(&document)?;
            for version in service.list_versions(&document)? {
                let location = version
                    .remote_key
                    .as_ref()
                    .map(|key| format!("remote:{}", key))
                    .or_else(|| version.local_path.as_ref().map(|key| format!("local:{}", key)))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  v{:<3} {} ({} bytes, {}) {} {}",
                    version.sequence,
                    version.file_name,
                    version.file_size,
                    version.content_type,
                    version.uploaded_at.format("%Y-%m-%d %H:%M"),
                    location
                );
            }
        }
        DocCommand::Url {
            document,
            version,
            expires,
        } => {
            let document = parse_document(&document)?;
            let url = service
                .get_url(&document, version, expires.map(Duration::from_secs))
                .await?;
            println!("{}", url);
        }
        DocCommand::Download {
            document,
            version,
            output,
        } => {
            let document = parse_document(&document)?;
            let (version, data) = service.download(&document, version).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&version.file_name));
            tokio::fs::write(&output, &data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Saved version {} to {} ({} bytes)", version.sequence, output.display(), data.len());
        }
        DocCommand::RmVersion { document, version } => {
            let document = parse_document(&document)?;
            let outcome = service.delete_version(&document, version).await?;
            println!("{}", outcome.message(service.storage().backend_name()));
        }
        DocCommand::Rm { document } => {
            let document = parse_document(&document)?;
            let removed = service.delete_document(&document).await?;
            info!("Removed document {}", document);
            println!("Document deleted ({} version(s))", removed);
        }
    }
    Ok(())
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(String::from)
        .with_context(|| format!("{} has no usable file name", path.display()))
}

async fn cmd_invoke(
    store: &CredentialStore,
    prompt: &str,
    model: Option<&str>,
    params: &InferenceParameters,
) -> Result<()> {
    let client = InferenceClient::from_store(store)?;
    let text = client
        .invoke(prompt, model, Some(params))
        .await
        .context("Model invocation failed")?;
    println!("{}", text);
    Ok(())
}
