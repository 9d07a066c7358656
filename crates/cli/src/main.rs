use bsfm_core::{
    CoreConfig, DepositKind, FileAttributes, FileRecord, FileStorageService, NonEmptyText,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bsfm")]
#[command(about = "Blob store file manager CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Ordinary,
    Special,
    Public,
}

impl From<Kind> for DepositKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Ordinary => DepositKind::Ordinary,
            Kind::Special => DepositKind::Special,
            Kind::Public => DepositKind::Public,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Store a local file
    Deposit {
        /// Logical folder
        folder: String,
        /// File to store
        path: PathBuf,
        /// Owner key
        #[arg(long)]
        owner: String,
        /// Target year
        #[arg(long)]
        year: i32,
        /// Deposit kind
        #[arg(long, value_enum, default_value = "ordinary")]
        kind: Kind,
        /// External reference (required for special deposits)
        #[arg(long)]
        external_ref: Option<String>,
        /// Content type (detected from the content when omitted)
        #[arg(long)]
        content_type: Option<String>,
        /// Stored filename (defaults to the local filename)
        #[arg(long)]
        name: Option<String>,
        /// Serve inline instead of as an attachment
        #[arg(long)]
        inline: bool,
    },
    /// Show a file's metadata
    Info {
        /// File key
        file_key: String,
    },
    /// List a folder
    List {
        /// Logical folder
        folder: String,
        /// Owner key (`*` for any)
        #[arg(long)]
        owner: Option<String>,
        /// Target year (0 for any)
        #[arg(long)]
        year: Option<i32>,
    },
    /// Write a file's content to disk
    Download {
        /// File key
        file_key: String,
        /// Output path
        output: PathBuf,
    },
    /// Set a file's status code
    SetStatus {
        /// File key
        file_key: String,
        /// Status code
        #[arg(allow_negative_numbers = true)]
        status: i32,
        /// Linked data (e.g. a virus signature)
        #[arg(long)]
        linked_data: Option<String>,
    },
    /// Hide a file without removing it
    SoftDelete {
        /// File key
        file_key: String,
    },
    /// Remove a file and its metadata
    Delete {
        /// File key
        file_key: String,
    },
    /// Rebuild missing metadata from header files
    Recover,
}

fn print_record(record: &FileRecord) {
    println!(
        "{}  {}  {}  owner={} year={} status={} size={} stored={}",
        record.file_key(),
        record.logical_folder(),
        record.original_file_name(),
        record.owner_key(),
        record.target_year(),
        record.status(),
        record.content_size(),
        record.storage_date()
    );
}

fn text(field: &str, value: &str) -> Result<NonEmptyText, Box<dyn std::error::Error>> {
    NonEmptyText::new(value).map_err(|e| format!("{field}: {e}").into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'bsfm --help' for commands");
        return Ok(());
    };

    let service = FileStorageService::from_config(&CoreConfig::from_env()?)?;

    match command {
        Commands::Deposit {
            folder,
            path,
            owner,
            year,
            kind,
            external_ref,
            content_type,
            name,
            inline,
        } => {
            let content = fs::read(&path)?;
            let file_name = match name {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or("path has no filename")?,
            };
            let content_type = content_type
                .unwrap_or_else(|| bsfm_files::detect_content_type(&content).to_owned());
            let attributes = FileAttributes {
                original_file_name: text("name", &file_name)?,
                content_type: text("content type", &content_type)?,
                owner_key: text("owner", &owner)?,
                target_year: year,
                external_ref,
                is_attachment: !inline,
            };
            match service.deposit(kind.into(), &folder, attributes, &content) {
                Ok(record) => print_record(&record),
                Err(e) => eprintln!("Error depositing {}: {}", path.display(), e),
            }
        }
        Commands::Info { file_key } => match service.get_info(&file_key) {
            Ok(record) => print_record(&record),
            Err(e) => eprintln!("Error reading {}: {}", file_key, e),
        },
        Commands::List {
            folder,
            owner,
            year,
        } => match service.list_folder(&folder, owner.as_deref(), year) {
            Ok(records) => records.iter().for_each(print_record),
            Err(e) => eprintln!("Error listing {}: {}", folder, e),
        },
        Commands::Download { file_key, output } => match service.download(&file_key) {
            Ok(mut download) => {
                let mut out = fs::File::create(&output)?;
                let written = io::copy(&mut download.content, &mut out)?;
                println!("Wrote {} bytes to {}", written, output.display());
            }
            Err(e) => eprintln!("Error downloading {}: {}", file_key, e),
        },
        Commands::SetStatus {
            file_key,
            status,
            linked_data,
        } => match service.update_status(&file_key, Some(status), linked_data) {
            Ok(record) => print_record(&record),
            Err(e) => eprintln!("Error updating {}: {}", file_key, e),
        },
        Commands::SoftDelete { file_key } => match service.soft_delete(&file_key) {
            Ok(record) => print_record(&record),
            Err(e) => eprintln!("Error soft-deleting {}: {}", file_key, e),
        },
        Commands::Delete { file_key } => match service.hard_delete(&file_key) {
            Ok(()) => println!("Deleted {}", file_key),
            Err(e) => eprintln!("Error deleting {}: {}", file_key, e),
        },
        Commands::Recover => match service.recover_from_headers() {
            Ok(report) => {
                println!(
                    "Restored {}, already present {}, failed {}",
                    report.restored.len(),
                    report.present.len(),
                    report.failed.len()
                );
                for (path, reason) in &report.failed {
                    println!("  {}: {}", path.display(), reason);
                }
            }
            Err(e) => eprintln!("Error recovering metadata: {}", e),
        },
    }

    Ok(())
}
