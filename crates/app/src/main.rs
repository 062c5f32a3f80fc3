mod extract;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use extract::{is_pdf, LopdfExtractor, PdfExtractor};
use pdf_tutor_core::{
    CharacterNgramEmbedder, Embedder, ImageCatalog, OllamaEmbedder, OllamaEndpoint,
    OllamaGenerator, TextGenerator, TopicId, TutorConfig, TutorPipeline,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-tutor", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON file with chunking, retrieval and image matching settings
    #[arg(long, env = "TUTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for per-topic snapshots (overrides the config file)
    #[arg(long, env = "TUTOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Folder holding the image catalog (metadata.json or image files)
    #[arg(long, env = "TUTOR_IMAGES_DIR", default_value = "images")]
    images_dir: PathBuf,

    /// Ollama base URL
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Bearer token for the model service
    #[arg(long, env = "TUTOR_API_KEY")]
    api_key: Option<String>,

    /// Embedding backend
    #[arg(long, value_enum, env = "TUTOR_EMBEDDER", default_value = "ngram")]
    embedder: EmbedderKind,

    /// Ollama embedding model
    #[arg(long, env = "TUTOR_EMBED_MODEL", default_value = "nomic-embed-text")]
    embed_model: String,

    /// Vector size produced by the embedding model
    #[arg(long, env = "TUTOR_EMBED_DIMENSIONS", default_value = "768")]
    embed_dimensions: usize,

    /// Ollama generation model
    #[arg(long, env = "TUTOR_CHAT_MODEL", default_value = "llama3")]
    chat_model: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Local hashed character trigrams
    Ngram,
    /// Ollama embeddings endpoint
    Ollama,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and persist a PDF as a topic.
    Upload {
        /// PDF file to process.
        #[arg(long)]
        pdf: PathBuf,
    },
    /// Ask a question about an uploaded topic.
    Ask {
        /// Topic id printed by `upload`.
        #[arg(long)]
        topic: String,
        /// Question text.
        #[arg(long)]
        question: String,
        /// Number of passages to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Print the image metadata stored with a topic.
    Images {
        #[arg(long)]
        topic: String,
    },
    /// Remove a topic snapshot.
    Delete {
        #[arg(long)]
        topic: String,
    },
}

type Pipeline = TutorPipeline<Box<dyn Embedder>, Box<dyn TextGenerator>>;

fn build_pipeline(cli: &Cli) -> anyhow::Result<Pipeline> {
    let mut config = match &cli.config {
        Some(path) => TutorConfig::from_json_file(path)?,
        None => TutorConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }

    let endpoint = OllamaEndpoint::new(&cli.ollama_url, cli.api_key.clone())?;
    let embedder: Box<dyn Embedder> = match cli.embedder {
        EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::default()),
        EmbedderKind::Ollama => Box::new(OllamaEmbedder::new(
            endpoint.clone(),
            &cli.embed_model,
            cli.embed_dimensions,
        )),
    };
    let generator: Box<dyn TextGenerator> =
        Box::new(OllamaGenerator::new(endpoint, &cli.chat_model));

    Ok(TutorPipeline::new(embedder, generator, config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut pipeline = build_pipeline(&cli)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %pipeline.config().data_dir.display(),
        "pdf-tutor boot"
    );

    match &cli.command {
        Command::Upload { pdf } => {
            if !is_pdf(pdf) {
                anyhow::bail!("only PDF files are allowed: {}", pdf.display());
            }
            let filename = pdf
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| anyhow::anyhow!("path has no file name: {}", pdf.display()))?;

            let pages = LopdfExtractor.extract_pages(pdf)?;
            info!(path = %pdf.display(), page_count = pages.len(), "extracted pages");

            pipeline.refresh_catalog(ImageCatalog::discover(&cli.images_dir)?);
            let report = pipeline.upload(filename, &pages).await?;

            println!("topic_id: {}", report.topic_id);
            println!(
                "{} chunks created at {}",
                report.chunks_created,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            topic,
            question,
            top_k,
        } => {
            let topic = TopicId::parse(topic)?;
            pipeline.refresh_catalog(ImageCatalog::discover(&cli.images_dir)?);

            let top_k = top_k.unwrap_or(pipeline.config().top_k);
            let response = pipeline.ask_with_top_k(&topic, question, top_k).await?;

            println!("{}", response.answer.trim());
            match &response.image {
                Some(image) => println!("image: {} ({})", image.filename, image.title),
                None => println!("image: none"),
            }
            println!("sources: {}", response.sources.join(", "));
        }
        Command::Images { topic } => {
            let topic = TopicId::parse(topic)?;
            let images = pipeline.topic_images(&topic)?;
            println!("{}", serde_json::to_string_pretty(&images)?);
        }
        Command::Delete { topic } => {
            let topic = TopicId::parse(topic)?;
            if pipeline.delete_topic(&topic)? {
                println!("deleted {topic}");
            } else {
                println!("no snapshot for {topic}");
            }
        }
    }

    Ok(())
}
