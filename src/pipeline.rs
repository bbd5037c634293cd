// 🚰 Streaming Pipeline
//
// Pull-parses one record element at a time out of a GLEIF bulk file:
//   bytes → RecordStream → strip_namespaces → RecordMapper → EntitySink
//
// Memory stays bounded by the largest single record; each record's tree is
// dropped as soon as its entities are handed to the sink.

use crate::entities::Entity;
use crate::error::{PipelineError, SkipReason, Warning};
use crate::lei::LeiRecordMapper;
use crate::reference::ReferenceTables;
use crate::relationship::RelationshipRecordMapper;
use crate::xml::{strip_namespaces, Element, TreeBuilder};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use tracing::{info, warn};

/// Log progress every N records
pub const PROGRESS_EVERY: u64 = 10_000;

// ============================================================================
// MAPPER SEAM
// ============================================================================

/// Output of mapping one record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapped {
    /// In emission order
    pub entities: Vec<Entity>,
    /// Sub-facts dropped from this record
    pub warnings: Vec<Warning>,
}

impl Mapped {
    /// Add a property value, recording a warning if the schema refuses it
    pub fn add(&mut self, entity: &mut Entity, property: &str, value: Option<&str>) {
        if let Err(err) = entity.add(property, value) {
            self.warnings.push(Warning::from(err));
        }
    }
}

/// Turns one normalized record element into graph objects
pub trait RecordMapper {
    /// Local name of the record element (`LEIRecord`)
    fn record_tag(&self) -> &'static str;

    /// Namespace URI the record element must be bound to
    fn namespace(&self) -> &'static str;

    /// Map one record whose tags are already namespace-free
    fn map(&self, record: &Element) -> Result<Mapped, SkipReason>;

    /// Identifier used in log lines about this record
    fn record_key(&self, _record: &Element) -> Option<String> {
        None
    }
}

// ============================================================================
// SINK SEAM
// ============================================================================

/// Receives entities one at a time, in file order
pub trait EntitySink {
    fn put(&mut self, entity: &Entity) -> anyhow::Result<()>;

    /// Called once after the last record of a file
    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl EntitySink for Vec<Entity> {
    fn put(&mut self, entity: &Entity) -> anyhow::Result<()> {
        self.push(entity.clone());
        Ok(())
    }
}

// ============================================================================
// FILE STATS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub record_tag: String,
    /// Matching record elements read
    pub seen: u64,
    /// Records that produced entities
    pub mapped: u64,
    /// Records dropped with a SkipReason
    pub skipped: u64,
    pub emitted: u64,
    pub warnings: u64,
    /// SkipReason label → count
    pub skip_reasons: BTreeMap<String, u64>,
}

impl FileStats {
    pub fn new(record_tag: &str) -> Self {
        FileStats {
            record_tag: record_tag.to_string(),
            ..Default::default()
        }
    }

    fn record_skip(&mut self, reason: &SkipReason) {
        self.skipped += 1;
        *self.skip_reasons.entry(reason.label().to_string()).or_insert(0) += 1;
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} seen, {} mapped, {} skipped, {} entities, {} warnings",
            self.record_tag, self.seen, self.mapped, self.skipped, self.emitted, self.warnings
        )
    }
}

// ============================================================================
// RECORD STREAM
// ============================================================================

/// Iterator over the record elements of one XML document
///
/// Only `{namespace}tag` start tags open a record; everything between
/// records is read and discarded without building a tree.
pub struct RecordStream<R: BufRead> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    namespace: &'static str,
    tag: &'static str,
    /// Elements open outside the record being built (`LEIData`, `LEIRecords`)
    depth: usize,
    done: bool,
}

impl<R: BufRead> RecordStream<R> {
    pub fn new(input: R, namespace: &'static str, tag: &'static str) -> Self {
        // Untrimmed: text and CDATA pieces are joined first, Element::text trims the whole
        let reader = NsReader::from_reader(input);

        RecordStream {
            reader,
            buf: Vec::new(),
            namespace,
            tag,
            depth: 0,
            done: false,
        }
    }

    fn fail(&mut self, position: u64, message: String) -> Option<Result<Element, PipelineError>> {
        self.done = true;
        Some(Err(PipelineError::Xml { position, message }))
    }
}

fn is_record(ns: &ResolveResult<'_>, start: &BytesStart<'_>, namespace: &str, tag: &str) -> bool {
    matches!(ns, ResolveResult::Bound(Namespace(uri)) if *uri == namespace.as_bytes())
        && start.local_name().as_ref() == tag.as_bytes()
}

impl<R: BufRead> Iterator for RecordStream<R> {
    type Item = Result<Element, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let (namespace, tag) = (self.namespace, self.tag);
        let mut builder = TreeBuilder::new();

        loop {
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;

            let finished = match self.reader.read_resolved_event_into(&mut self.buf) {
                Err(err) => Err(err.to_string()),
                Ok((ns, Event::Start(start))) => {
                    if builder.is_building() || is_record(&ns, &start, namespace, tag) {
                        Element::from_start(&start)
                            .map(|element| {
                                builder.start(element);
                                None
                            })
                            .map_err(|err| err.to_string())
                    } else {
                        self.depth += 1;
                        Ok(None)
                    }
                }
                Ok((ns, Event::Empty(start))) => {
                    if builder.is_building() || is_record(&ns, &start, namespace, tag) {
                        Element::from_start(&start)
                            .map(|element| builder.empty(element))
                            .map_err(|err| err.to_string())
                    } else {
                        Ok(None)
                    }
                }
                Ok((_, Event::Text(text))) if builder.is_building() => text
                    .unescape()
                    .map(|text| {
                        builder.text(&text);
                        None
                    })
                    .map_err(|err| err.to_string()),
                Ok((_, Event::CData(data))) if builder.is_building() => {
                    builder.text(&String::from_utf8_lossy(&data.into_inner()));
                    Ok(None)
                }
                Ok((_, Event::End(_))) if builder.is_building() => Ok(builder.end()),
                Ok((_, Event::End(_))) => {
                    self.depth = self.depth.saturating_sub(1);
                    Ok(None)
                }
                Ok((_, Event::Eof)) => {
                    if builder.is_building() {
                        Err(format!("document ended inside <{}>", tag))
                    } else if self.depth > 0 {
                        Err(format!(
                            "document ended with {} element(s) still open",
                            self.depth
                        ))
                    } else {
                        self.done = true;
                        return None;
                    }
                }
                Ok(_) => Ok(None),
            };

            match finished {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(message) => return self.fail(position, message),
            }
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Drive one mapper over one XML document
///
/// Record-level problems are logged and counted; a parse error, a sink
/// failure, or a file with no mapped record at all is fatal.
pub fn run_pipeline<R, M, S>(input: R, mapper: &M, sink: &mut S) -> Result<FileStats, PipelineError>
where
    R: BufRead,
    M: RecordMapper + ?Sized,
    S: EntitySink + ?Sized,
{
    let tag = mapper.record_tag();
    let mut stats = FileStats::new(tag);

    for record in RecordStream::new(input, mapper.namespace(), tag) {
        let mut record = record?;
        stats.seen += 1;
        if stats.seen % PROGRESS_EVERY == 0 {
            info!(records = stats.seen, emitted = stats.emitted, "parsing {}", tag);
        }

        strip_namespaces(&mut record);

        match mapper.map(&record) {
            Ok(mapped) => {
                stats.mapped += 1;
                for warning in &mapped.warnings {
                    stats.warnings += 1;
                    warn!(
                        record = mapper.record_key(&record).as_deref().unwrap_or("?"),
                        "{}",
                        warning
                    );
                }
                for entity in &mapped.entities {
                    sink.put(entity).map_err(|err| PipelineError::Sink {
                        id: entity.id.clone(),
                        message: format!("{:#}", err),
                    })?;
                    stats.emitted += 1;
                }
            }
            Err(reason) => {
                warn!(
                    record = mapper.record_key(&record).as_deref().unwrap_or("?"),
                    reason = reason.label(),
                    "skipping {}: {}",
                    tag,
                    reason
                );
                stats.record_skip(&reason);
            }
        }
    }

    sink.flush().map_err(|err| PipelineError::Sink {
        id: String::new(),
        message: format!("{:#}", err),
    })?;

    if stats.mapped == 0 {
        return Err(PipelineError::NoRecords { tag });
    }

    info!("{}", stats.summary());
    Ok(stats)
}

/// Map a LEI-CDF file (`LEIRecord` elements)
pub fn parse_lei_file<R, S>(
    input: R,
    tables: &ReferenceTables,
    sink: &mut S,
) -> Result<FileStats, PipelineError>
where
    R: BufRead,
    S: EntitySink + ?Sized,
{
    run_pipeline(input, &LeiRecordMapper::new(tables), sink)
}

/// Map an RR-CDF file (`RelationshipRecord` elements)
pub fn parse_rr_file<R, S>(input: R, sink: &mut S) -> Result<FileStats, PipelineError>
where
    R: BufRead,
    S: EntitySink + ?Sized,
{
    run_pipeline(input, &RelationshipRecordMapper, sink)
}

// ============================================================================
// TESTS
// ============================================================================
