use std::io::Write;
use std::sync::Arc;

use tracing::{error, info};

use kgrag_core::document::DocumentLoader;
use kgrag_core::error::{KgError, Result};
use kgrag_core::graph::{GraphConnector, GraphStore};
use kgrag_core::llm::{EmbeddingModel, LanguageModel};
use kgrag_core::Document;
use kgrag_extraction::{IndexOptions, KnowledgeGraphIndex};
use kgrag_query::{AsQueryEngine, QueryOptions};

pub const DEFAULT_QUESTIONS: [&str; 2] = [
    "What are the authors details?",
    "list out all research paper title.",
];

/// `writeln!` with failures reported as [`KgError::Output`].
macro_rules! emit {
    ($out:expr, $($arg:tt)*) => {
        writeln!($out, $($arg)*).map_err(KgError::Output)
    };
}

const CONNECT_HINT: &str =
    "Please ensure your Neo4j instance is running and credentials are correct.";

/// How a run ended. Determines the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    LoadFailed,
    ConnectFailed,
    /// Index build or a query failed after the graph store was connected.
    IndexOrQueryFailed,
}

impl RunStatus {
    /// `strict` turns index/query failures into a failing exit code.
    pub fn exit_code(self, strict: bool) -> u8 {
        match self {
            RunStatus::Completed => 0,
            RunStatus::LoadFailed | RunStatus::ConnectFailed => 1,
            RunStatus::IndexOrQueryFailed => u8::from(strict),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub status: RunStatus,
    pub documents: usize,
    /// One answer per question that was answered, in order.
    pub answers: Vec<String>,
}

impl RunReport {
    fn new(status: RunStatus, documents: usize) -> Self {
        Self {
            status,
            documents,
            answers: Vec::new(),
        }
    }
}

/// The sequential load → connect → index → query run.
pub struct Pipeline {
    llm: Arc<dyn LanguageModel>,
    embed_model: Arc<dyn EmbeddingModel>,
    loader: Box<dyn DocumentLoader>,
    connector: Box<dyn GraphConnector>,
    index_options: IndexOptions,
    query_options: QueryOptions,
    questions: Vec<String>,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embed_model: Arc<dyn EmbeddingModel>,
        loader: Box<dyn DocumentLoader>,
        connector: Box<dyn GraphConnector>,
    ) -> Self {
        Self {
            llm,
            embed_model,
            loader,
            connector,
            index_options: IndexOptions::default(),
            query_options: QueryOptions::default(),
            questions: DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect(),
        }
    }

    pub fn with_index_options(mut self, options: IndexOptions) -> Self {
        self.index_options = options;
        self
    }

    pub fn with_query_options(mut self, options: QueryOptions) -> Self {
        self.query_options = options;
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    fn index_label(&self) -> &'static str {
        if self.index_options.include_embeddings {
            "with embeddings"
        } else {
            "without embeddings"
        }
    }

    fn query_label(&self) -> String {
        format!("{}/{}", self.index_label(), self.query_options.embedding_mode)
    }

    /// Run every stage, writing progress and answers to `out`.
    ///
    /// Stage failures are reported through [`RunReport::status`]; the only
    /// error returned is [`KgError::Output`], a failure to write to `out`.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<RunReport> {
        // ── Load ──
        let documents = match self.loader.load().await {
            Ok(documents) => documents,
            Err(e) => {
                error!(source = %self.loader.source(), error = %e, "Document load failed");
                emit!(out, "Error loading documents: {e}")?;
                return Ok(RunReport::new(RunStatus::LoadFailed, 0));
            }
        };
        emit!(out, "Loaded {} documents.", documents.len())?;

        // ── Connect ──
        let backend = self.connector.backend();
        let store = match self.connector.connect().await {
            Ok(store) => store,
            Err(e) => {
                error!(backend = backend, error = %e, "Graph store connection failed");
                emit!(out, "Error initializing {backend} Graph Store: {e}")?;
                emit!(out, "{CONNECT_HINT}")?;
                return Ok(RunReport::new(RunStatus::ConnectFailed, documents.len()));
            }
        };
        emit!(out, "{backend} Graph Store initialized successfully.")?;

        // ── Index + query ──
        let mut report = RunReport::new(RunStatus::Completed, documents.len());
        if let Err(e) = self.index_and_query(&documents, store, out, &mut report).await {
            if matches!(e, KgError::Output(_)) {
                return Err(e);
            }
            error!(error = %e, "Index build or query failed");
            emit!(
                out,
                "Error during KG index creation or querying ({}): {e}",
                self.index_label()
            )?;
            report.status = RunStatus::IndexOrQueryFailed;
        }

        info!(
            documents = report.documents,
            answers = report.answers.len(),
            status = ?report.status,
            "Run finished"
        );
        Ok(report)
    }

    async fn index_and_query<W: Write>(
        &self,
        documents: &[Document],
        store: Arc<dyn GraphStore>,
        out: &mut W,
        report: &mut RunReport,
    ) -> Result<()> {
        let label = self.index_label();
        emit!(out, "\n--- Creating Knowledge Graph Index ({label}) ---")?;

        let index = KnowledgeGraphIndex::from_documents(
            documents,
            store,
            self.llm.clone(),
            self.embed_model.clone(),
            &self.index_options,
        )
        .await?;
        emit!(out, "Knowledge Graph Index ({label}) created.")?;

        let query_label = self.query_label();
        emit!(out, "\n--- Querying Index ({query_label}) ---")?;
        let engine = index.as_query_engine(self.query_options.clone());

        for (i, question) in self.questions.iter().enumerate() {
            emit!(out, "Question-{}:", i + 1)?;
            let response = engine.query(question).await?;
            emit!(out, "Response ({query_label}): {response}")?;
            report.answers.push(response.answer);
        }

        Ok(())
    }
}
