//! Sequential diagram rendering.
//!
//! Diagram engines are not re-entrant when handed colliding element ids, so
//! every render pass goes through one FIFO worker.  Callers may invoke
//! [`DiagramRenderer::render_diagrams`] from any number of tasks; passes run
//! one at a time in submission order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::markdown::{DIAGRAM_CLASS, SOURCE_ATTRIBUTE, decode_source, escape_html, unescape_html};
use crate::observability::{DIAGRAM_FAILURES, DIAGRAM_LIBRARY_TIMEOUTS, DIAGRAM_RENDERS};
use crate::types::message::random_base36;

/// Diagram types accepted on the first non-blank line of a source.
pub const DIAGRAM_KEYWORDS: &[&str] = &[
    "graph",
    "flowchart",
    "sequenceDiagram",
    "classDiagram",
    "stateDiagram",
    "erDiagram",
    "journey",
    "gantt",
    "pie",
    "gitgraph",
    "mindmap",
    "timeline",
    "sankey",
];

const SVG_STYLE: &str = "display:block;width:100%;max-width:100%;height:auto;overflow:visible";

const LIBRARY_WARNING: &str = concat!(
    r#"<div class="diagram-error">"#,
    "Diagram rendering is unavailable because the diagram library did not load. ",
    "Diagram sources are shown instead.",
    "</div>"
);

static PENDING_CONTAINER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?s)<div class="{DIAGRAM_CLASS}"(?: {SOURCE_ATTRIBUTE}="([A-Za-z0-9+/=]*)")?>(.*?)</div>"#
    ))
    .expect("container pattern is valid")
});

/// Something that turns diagram source into SVG markup.
#[async_trait::async_trait]
pub trait DiagramEngine: Send + Sync {
    /// Render `source` for the element `id`, returning markup with an `<svg>` root.
    async fn render(&self, id: &str, source: &str) -> Result<String>;
}

/// Source of a diagram engine that may become available some time after startup.
pub trait DiagramLibrary: Send + Sync {
    /// The engine, if it has finished loading.
    fn load(&self) -> Option<Arc<dyn DiagramEngine>>;
}

/// A library whose engine is available from the start.
#[derive(Clone)]
pub struct Preloaded(pub Arc<dyn DiagramEngine>);

impl DiagramLibrary for Preloaded {
    fn load(&self) -> Option<Arc<dyn DiagramEngine>> {
        Some(Arc::clone(&self.0))
    }
}

/// A library that never loads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl DiagramLibrary for Unavailable {
    fn load(&self) -> Option<Arc<dyn DiagramEngine>> {
        None
    }
}

/// An engine that draws the diagram source as lines of SVG text.
///
/// It accepts every source that passes validation.  The terminal front-end
/// uses it so diagrams show up as their outline rather than not at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutlineEngine;

#[async_trait::async_trait]
impl DiagramEngine for OutlineEngine {
    async fn render(&self, id: &str, source: &str) -> Result<String> {
        let lines: Vec<&str> = source.lines().collect();
        let height = 20 * lines.len().max(1) + 10;
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" id="{}-svg" viewBox="0 0 640 {height}">"#,
            escape_html(id)
        );
        for (row, line) in lines.iter().enumerate() {
            svg.push_str(&format!(
                r#"<text x="10" y="{}">{}</text>"#,
                20 * (row + 1),
                escape_html(line)
            ));
        }
        svg.push_str("</svg>");
        Ok(svg)
    }
}

/// Timing for the wait on the diagram library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagramOptions {
    /// How long to wait for the library before giving up on a pass.
    pub library_timeout: Duration,
    /// Delay between availability checks.
    pub poll_interval: Duration,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            library_timeout: Duration::from_millis(15_000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiagramReport {
    /// Containers that now hold a diagram.
    pub rendered: usize,
    /// Containers that now hold a fallback block.
    pub failed: usize,
}

impl DiagramReport {
    /// Containers handled by the pass.
    pub fn total(&self) -> usize {
        self.rendered + self.failed
    }
}

struct Job {
    fragment: Fragment,
    reply: oneshot::Sender<Result<DiagramReport>>,
}

/// Handle to the diagram render queue.
///
/// Cloning the handle shares the queue.
#[derive(Clone)]
pub struct DiagramRenderer {
    jobs: mpsc::UnboundedSender<Job>,
}

impl DiagramRenderer {
    /// Start a render worker with default timing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(library: Arc<dyn DiagramLibrary>) -> Self {
        Self::with_options(library, DiagramOptions::default())
    }

    /// Start a render worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_options(library: Arc<dyn DiagramLibrary>, options: DiagramOptions) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            library,
            options,
            engine: None,
        };
        tokio::spawn(worker.run(rx));
        Self { jobs }
    }

    /// Render every pending diagram container in `fragment`.
    ///
    /// Each container ends up either rendered or replaced by a fallback that
    /// shows its source and the error.  If the library never loads, every
    /// container gets a fallback, a warning is appended to the fragment, and
    /// the pass returns [`Error::DiagramLibraryUnavailable`].
    pub async fn render_diagrams(&self, fragment: &Fragment) -> Result<DiagramReport> {
        let (reply, response) = oneshot::channel();
        let job = Job {
            fragment: fragment.clone(),
            reply,
        };
        self.jobs
            .send(job)
            .map_err(|_| Error::render("diagram worker has stopped"))?;
        response
            .await
            .map_err(|_| Error::render("diagram worker dropped the job"))?
    }
}

struct Worker {
    library: Arc<dyn DiagramLibrary>,
    options: DiagramOptions,
    engine: Option<Arc<dyn DiagramEngine>>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            let result = self.process(&job.fragment).await;
            // The caller may have stopped waiting; the fragment is updated regardless.
            let _ = job.reply.send(result);
        }
        tracing::debug!("diagram worker exiting");
    }

    async fn process(&mut self, fragment: &Fragment) -> Result<DiagramReport> {
        let pending = claim_containers(fragment);
        if pending.is_empty() {
            return Ok(DiagramReport::default());
        }

        let Some(engine) = self.wait_for_library().await else {
            DIAGRAM_LIBRARY_TIMEOUTS.click();
            let waited = self.options.library_timeout;
            tracing::warn!(
                waited_ms = waited.as_millis() as u64,
                diagrams = pending.len(),
                "diagram library did not load"
            );
            for diagram in &pending {
                let message = format!("Diagram library failed to load within {}ms", waited.as_millis());
                fragment.update(|html| replace_container(html, &diagram.id, &fallback(diagram, &message)));
            }
            fragment.append_html(LIBRARY_WARNING);
            return Err(Error::diagram_library_unavailable(waited));
        };

        let mut report = DiagramReport::default();
        for diagram in &pending {
            let outcome = render_one(engine.as_ref(), diagram).await;
            let markup = match outcome {
                Ok(svg) => {
                    DIAGRAM_RENDERS.click();
                    report.rendered += 1;
                    rendered(diagram, &svg)
                }
                Err(err) => {
                    DIAGRAM_FAILURES.click();
                    report.failed += 1;
                    tracing::warn!(id = %diagram.id, error = %err, "diagram failed to render");
                    fallback(diagram, &err.detail())
                }
            };
            fragment.update(|html| replace_container(html, &diagram.id, &markup));
        }
        Ok(report)
    }

    async fn wait_for_library(&mut self) -> Option<Arc<dyn DiagramEngine>> {
        if let Some(engine) = &self.engine {
            return Some(Arc::clone(engine));
        }
        let started = Instant::now();
        loop {
            if let Some(engine) = self.library.load() {
                tracing::debug!(
                    waited_ms = started.elapsed().as_millis() as u64,
                    "diagram library loaded"
                );
                self.engine = Some(Arc::clone(&engine));
                return Some(engine);
            }
            if started.elapsed() >= self.options.library_timeout {
                return None;
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingDiagram {
    id: String,
    encoded: String,
    source: String,
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A fresh element id: `diagram-{unix millis}-{sequence}-{random}`.
pub fn next_diagram_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("diagram-{millis}-{seq}-{}", random_base36(9))
}

/// Assign ids to every unclaimed container and mark it pending.
fn claim_containers(fragment: &Fragment) -> Vec<PendingDiagram> {
    fragment.update(|html| {
        let mut pending = Vec::new();
        let claimed = PENDING_CONTAINER.replace_all(html, |caps: &regex::Captures<'_>| {
            let text = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let encoded = caps.get(1).map(|m| m.as_str().to_string());
            let source = encoded
                .as_deref()
                .and_then(decode_source)
                .unwrap_or_else(|| unescape_html(text).trim().to_string());
            let encoded = encoded.unwrap_or_else(|| {
                use base64::Engine as _;
                base64::engine::general_purpose::STANDARD.encode(source.as_bytes())
            });
            let diagram = PendingDiagram {
                id: next_diagram_id(),
                encoded,
                source,
            };
            let markup = container(&diagram, "diagram-pending", &escape_html(&diagram.source));
            pending.push(diagram);
            markup
        });
        let claimed = claimed.into_owned();
        *html = claimed;
        pending
    })
}

fn container(diagram: &PendingDiagram, state: &str, inner: &str) -> String {
    format!(
        r#"<div class="{DIAGRAM_CLASS} {state}" id="{}" {SOURCE_ATTRIBUTE}="{}">{inner}</div>"#,
        diagram.id, diagram.encoded
    )
}

fn rendered(diagram: &PendingDiagram, svg: &str) -> String {
    container(diagram, "diagram-rendered", &normalize_svg(svg))
}

fn fallback(diagram: &PendingDiagram, message: &str) -> String {
    let inner = format!(
        r#"<pre class="diagram-source"><code>{}</code></pre><p class="diagram-error-message">Error: {}</p>"#,
        escape_html(&diagram.source),
        escape_html(message)
    );
    container(diagram, "diagram-fallback", &inner)
}

/// Swap the element carrying `id` for `markup`.
///
/// The element is found by its opening tag; its content never contains a
/// `</div>` while it is pending.
fn replace_container(html: &mut String, id: &str, markup: &str) -> bool {
    let needle = format!(r#"id="{id}""#);
    let Some(attr) = html.find(&needle) else {
        return false;
    };
    let Some(start) = html[..attr].rfind("<div") else {
        return false;
    };
    let Some(close) = html[attr..].find("</div>") else {
        return false;
    };
    let end = attr + close + "</div>".len();
    html.replace_range(start..end, markup);
    true
}

async fn render_one(engine: &dyn DiagramEngine, diagram: &PendingDiagram) -> Result<String> {
    validate_source(&diagram.source)?;
    let svg = engine.render(&diagram.id, &diagram.source).await?;
    if !svg.contains("<svg") {
        return Err(Error::render("Diagram library returned no SVG output"));
    }
    Ok(svg)
}

/// Check that the first non-blank line names a known diagram type.
pub fn validate_source(source: &str) -> Result<()> {
    let Some(first) = source.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Err(Error::validation("Diagram source is empty", None));
    };
    let first = first.to_lowercase();
    if DIAGRAM_KEYWORDS
        .iter()
        .any(|keyword| first.contains(&keyword.to_lowercase()))
    {
        Ok(())
    } else {
        Err(Error::validation(
            format!("Invalid diagram syntax: unrecognized diagram type in \"{first}\""),
            None,
        ))
    }
}

/// Force the root `<svg>` to lay out as a full-width block.
pub fn normalize_svg(svg: &str) -> String {
    let Some(open) = svg.find("<svg") else {
        return svg.to_string();
    };
    let tag_end = svg[open..].find('>').map(|i| open + i).unwrap_or(svg.len());
    let tag = &svg[open..tag_end];
    let mut out = String::with_capacity(svg.len() + SVG_STYLE.len() + 10);
    out.push_str(&svg[..open]);
    match tag.find(r#"style=""#) {
        Some(style) => {
            let insert = open + style + r#"style=""#.len();
            out.push_str(&svg[open..insert]);
            out.push_str(SVG_STYLE);
            out.push(';');
            out.push_str(&svg[insert..]);
        }
        None => {
            out.push_str("<svg");
            out.push_str(&format!(r#" style="{SVG_STYLE}""#));
            out.push_str(&svg[open + "<svg".len()..]);
        }
    }
    out
}
