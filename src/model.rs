use hashbrown::HashMap;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use std::collections::BTreeMap;
use std::path::Path;

use crate::{consts::*, error::PipelineError, gzip};

/// Cross-references of a model entity: namespace -> identifiers, in
/// encounter order.
pub type Annotation = BTreeMap<String, Vec<String>>;

/// An SBML level 3 model with the fbc package, as CarveMe and gapseq write it.
///
/// Only what the pipeline touches is typed: reaction and species ids without
/// their `R_`/`M_` prefixes, species formulas and the RDF cross-references of
/// both. The source document is kept and streamed back on write; entities
/// whose typed fields are unchanged are copied byte for byte.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub id: String,
    pub reactions: Vec<Reaction>,
    pub metabolites: Vec<Metabolite>,
    document: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reaction {
    pub id: String,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metabolite {
    pub id: String,
    pub formula: Option<String>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Reaction,
    Species,
}

impl Kind {
    fn of(element: &BytesStart) -> Option<Self> {
        match element.local_name().as_ref() {
            b"reaction" => Some(Self::Reaction),
            b"species" => Some(Self::Species),
            _ => None,
        }
    }

    fn strip(self, sbml_id: &str) -> String {
        let prefix = match self {
            Self::Reaction => SBML_REACTION_PREFIX,
            Self::Species => SBML_SPECIES_PREFIX,
        };
        sbml_id.strip_prefix(prefix).unwrap_or(sbml_id).to_string()
    }
}

/// Entity element currently open while writing.
struct Open<'m> {
    depth: usize,
    about: String,
    annotation: &'m Annotation,
    written: bool,
}

impl Model {
    /// Read a gzip-compressed SBML model.
    ///
    /// # Example
    ///
    /// ```rust, no_run
    /// let model = gemflow::model::Model::read_gz("A.xml.gz".as_ref()).unwrap();
    /// ```
    pub fn read_gz(path: &Path) -> Result<Self, PipelineError> {
        let invalid = |message: String| PipelineError::ModelParse {
            path: path.to_path_buf(),
            message,
        };

        let bytes = gzip::decompress(path).map_err(|e| invalid(e.to_string()))?;
        Self::parse(bytes).map_err(invalid)
    }

    /// Render the model and gzip it into `path`.
    pub fn write_gz(&self, path: &Path) -> Result<(), PipelineError> {
        let bytes = self.render().map_err(|message| PipelineError::ModelParse {
            path: path.to_path_buf(),
            message,
        })?;
        gzip::write(&bytes, path)?;

        Ok(())
    }

    fn parse(document: Vec<u8>) -> Result<Self, String> {
        let mut id = None;
        let mut reactions: Vec<Reaction> = Vec::new();
        let mut metabolites: Vec<Metabolite> = Vec::new();

        {
            let mut reader = Reader::from_reader(document.as_slice());
            let mut depth = 0usize;
            let mut open: Option<(Kind, usize)> = None;
            let mut in_annotation: Option<usize> = None;

            loop {
                let (element, empty) = match reader.read_event().map_err(|e| e.to_string())? {
                    Event::Start(element) => (element, false),
                    Event::Empty(element) => (element, true),
                    Event::End(_) => {
                        if in_annotation == Some(depth) {
                            in_annotation = None;
                        }
                        if open.map(|(_, at)| at) == Some(depth) {
                            open = None;
                        }
                        depth = depth.saturating_sub(1);
                        continue;
                    }
                    Event::Eof => break,
                    _ => continue,
                };
                depth += 1;

                if in_annotation.is_some() {
                    let annotation = match open {
                        Some((Kind::Reaction, _)) => reactions.last_mut().map(|r| &mut r.annotation),
                        Some((Kind::Species, _)) => metabolites.last_mut().map(|m| &mut m.annotation),
                        None => None,
                    };
                    if let Some(annotation) = annotation {
                        collect_resource(&element, annotation)?;
                    }
                } else if let Some(kind) = Kind::of(&element).filter(|_| open.is_none()) {
                    let sbml_id = attribute(&element, b"id")?
                        .ok_or_else(|| format!("{:?} element without an id", kind))?;

                    match kind {
                        Kind::Reaction => reactions.push(Reaction {
                            id: kind.strip(&sbml_id),
                            annotation: Annotation::new(),
                        }),
                        Kind::Species => metabolites.push(Metabolite {
                            id: kind.strip(&sbml_id),
                            formula: attribute(&element, SBML_FORMULA.as_bytes())?,
                            annotation: Annotation::new(),
                        }),
                    }

                    if !empty {
                        open = Some((kind, depth));
                    }
                } else if element.local_name().as_ref() == b"annotation"
                    && !empty
                    && open.map(|(_, at)| at + 1) == Some(depth)
                {
                    in_annotation = Some(depth);
                } else if element.local_name().as_ref() == b"model" && id.is_none() {
                    id = attribute(&element, b"id")?;
                }

                if empty {
                    depth -= 1;
                }
            }
        }

        if id.is_none() {
            return Err("no <model> element found".into());
        }

        Ok(Self {
            id: id.unwrap_or_default(),
            reactions,
            metabolites,
            document,
        })
    }

    fn render(&self) -> Result<Vec<u8>, String> {
        let reactions: HashMap<&str, &Reaction> = self
            .reactions
            .iter()
            .map(|reaction| (reaction.id.as_str(), reaction))
            .collect();
        let metabolites: HashMap<&str, &Metabolite> = self
            .metabolites
            .iter()
            .map(|metabolite| (metabolite.id.as_str(), metabolite))
            .collect();

        let mut reader = Reader::from_reader(self.document.as_slice());
        let mut writer = Writer::new(Vec::with_capacity(self.document.len()));
        let mut depth = 0usize;
        let mut open: Option<Open> = None;
        let mut buffer: Vec<Event> = Vec::new();
        let mut buffering = false;

        loop {
            let event = reader.read_event().map_err(|e| e.to_string())?;

            if buffering {
                let closes = matches!(event, Event::End(_))
                    && open.as_ref().map(|o| o.depth + 1) == Some(depth);
                match &event {
                    Event::Start(_) => depth += 1,
                    Event::End(_) => depth -= 1,
                    Event::Eof => return Err("unterminated <annotation> element".into()),
                    _ => {}
                }
                buffer.push(event);

                if closes {
                    buffering = false;
                    if let Some(o) = &open {
                        if annotation_of(&buffer)? == *o.annotation {
                            for event in buffer.drain(..) {
                                emit(&mut writer, event)?;
                            }
                        } else {
                            buffer.clear();
                            if !o.annotation.is_empty() {
                                write_annotation(&mut writer, &o.about, o.annotation)?;
                            }
                        }
                    }
                }
                continue;
            }

            match event {
                Event::Start(ref element) | Event::Empty(ref element) => {
                    let empty = matches!(event, Event::Empty(_));
                    let at = depth + 1;

                    if open.is_none() {
                        if let Some(kind) = Kind::of(element) {
                            let sbml_id = attribute(element, b"id")?.unwrap_or_default();
                            let id = kind.strip(&sbml_id);
                            let (annotation, formula) = match kind {
                                Kind::Reaction => match reactions.get(id.as_str()) {
                                    Some(reaction) => (Some(&reaction.annotation), None),
                                    None => (None, None),
                                },
                                Kind::Species => match metabolites.get(id.as_str()) {
                                    Some(metabolite) => (
                                        Some(&metabolite.annotation),
                                        Some(metabolite.formula.as_deref()),
                                    ),
                                    None => (None, None),
                                },
                            };

                            if let Some(annotation) = annotation {
                                let (start, about) =
                                    retag(element, &sbml_id, annotation, formula)?;

                                if empty && !annotation.is_empty() {
                                    let name =
                                        String::from_utf8_lossy(element.name().as_ref()).into_owned();
                                    emit(&mut writer, Event::Start(start))?;
                                    write_annotation(&mut writer, &about, annotation)?;
                                    emit(&mut writer, Event::End(BytesEnd::new(name)))?;
                                } else if empty {
                                    emit(&mut writer, Event::Empty(start))?;
                                } else {
                                    emit(&mut writer, Event::Start(start))?;
                                    open = Some(Open {
                                        depth: at,
                                        about,
                                        annotation,
                                        written: false,
                                    });
                                    depth = at;
                                }
                                continue;
                            }
                        }
                    } else if let Some(o) = open.as_mut() {
                        if at == o.depth + 1 && !o.written {
                            let local = element.local_name();
                            if local.as_ref() == b"annotation" {
                                o.written = true;
                                if empty {
                                    if o.annotation.is_empty() {
                                        emit(&mut writer, event)?;
                                    } else {
                                        write_annotation(&mut writer, &o.about, o.annotation)?;
                                    }
                                } else {
                                    buffer.push(event);
                                    buffering = true;
                                    depth = at;
                                }
                                continue;
                            } else if local.as_ref() != b"notes" {
                                // annotation precedes every other child
                                if !o.annotation.is_empty() {
                                    write_annotation(&mut writer, &o.about, o.annotation)?;
                                }
                                o.written = true;
                            }
                        }
                    }

                    if !empty {
                        depth = at;
                    }
                    emit(&mut writer, event)?;
                }
                Event::End(_) => {
                    if let Some(o) = open.as_ref() {
                        if o.depth == depth {
                            if !o.written && !o.annotation.is_empty() {
                                write_annotation(&mut writer, &o.about, o.annotation)?;
                            }
                            open = None;
                        }
                    }
                    depth = depth.saturating_sub(1);
                    emit(&mut writer, event)?;
                }
                Event::Eof => break,
                other => emit(&mut writer, other)?,
            }
        }

        Ok(writer.into_inner())
    }
}

/// Start tag of an entity with its formula and metaid brought up to date.
///
/// Returns the tag to write and the metaid the RDF block refers to.
fn retag<'e>(
    element: &BytesStart<'e>,
    sbml_id: &str,
    annotation: &Annotation,
    formula: Option<Option<&str>>,
) -> Result<(BytesStart<'e>, String), String> {
    let metaid = attribute(element, b"metaid")?;
    let add_metaid = metaid.is_none() && !annotation.is_empty();
    let about = metaid.unwrap_or_else(|| format!("{}{}", SBML_METAID_PREFIX, sbml_id));

    let formula_changed = match formula {
        Some(formula) => attribute(element, SBML_FORMULA.as_bytes())?.as_deref() != formula,
        None => false,
    };

    if !add_metaid && !formula_changed {
        return Ok((element.clone(), about));
    }

    let mut tag = BytesStart::new(String::from_utf8_lossy(element.name().as_ref()).into_owned());
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if formula_changed && attr.key.as_ref() == SBML_FORMULA.as_bytes() {
            continue;
        }
        tag.push_attribute(attr);
    }
    if add_metaid {
        tag.push_attribute(("metaid", about.as_str()));
    }
    if let Some(Some(formula)) = formula.filter(|_| formula_changed) {
        tag.push_attribute((SBML_FORMULA, formula));
    }

    Ok((tag, about))
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), String> {
    writer.write_event(event).map_err(|e| e.to_string())
}

/// Write a `bqbiol:is` RDF block holding every identifier of `annotation`.
fn write_annotation(
    writer: &mut Writer<Vec<u8>>,
    about: &str,
    annotation: &Annotation,
) -> Result<(), String> {
    let about = format!("#{}", about);

    emit(writer, Event::Start(BytesStart::new("annotation")))?;
    emit(
        writer,
        Event::Start(
            BytesStart::new("rdf:RDF").with_attributes([("xmlns:rdf", RDF_NS), ("xmlns:bqbiol", BQBIOL_NS)]),
        ),
    )?;
    emit(
        writer,
        Event::Start(BytesStart::new("rdf:Description").with_attributes([("rdf:about", about.as_str())])),
    )?;
    emit(writer, Event::Start(BytesStart::new("bqbiol:is")))?;
    emit(writer, Event::Start(BytesStart::new("rdf:Bag")))?;

    for (namespace, ids) in annotation {
        for id in ids {
            let url = format!("{}/{}/{}", IDENTIFIERS_ORG, namespace, id);
            emit(
                writer,
                Event::Empty(BytesStart::new("rdf:li").with_attributes([("rdf:resource", url.as_str())])),
            )?;
        }
    }

    for name in ["rdf:Bag", "bqbiol:is", "rdf:Description", "rdf:RDF", "annotation"] {
        emit(writer, Event::End(BytesEnd::new(name)))?;
    }

    Ok(())
}

fn attribute(element: &BytesStart, key: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }

    Ok(None)
}

fn collect_resource(element: &BytesStart, annotation: &mut Annotation) -> Result<(), String> {
    if element.local_name().as_ref() == b"li" {
        if let Some(url) = attribute(element, b"rdf:resource")? {
            add_cross_reference(annotation, &url);
        }
    }

    Ok(())
}

fn annotation_of(events: &[Event]) -> Result<Annotation, String> {
    let mut annotation = Annotation::new();
    for event in events {
        if let Event::Start(element) | Event::Empty(element) = event {
            collect_resource(element, &mut annotation)?;
        }
    }

    Ok(annotation)
}

/// Split a cross-reference URL into `(namespace, identifier)`.
///
/// The identifier is the last path segment and the namespace the one before
/// it; compact `prefix:id` forms are split on the colon.
///
/// # Example
///
/// ```rust
/// use gemflow::model::parse_cross_reference;
///
/// assert_eq!(
///     parse_cross_reference("http://identifiers.org/kegg.compound/C00031"),
///     Some(("kegg.compound".to_string(), "C00031".to_string()))
/// );
/// assert_eq!(
///     parse_cross_reference("https://identifiers.org/CHEBI:4167"),
///     Some(("chebi".to_string(), "4167".to_string()))
/// );
/// ```
pub fn parse_cross_reference(url: &str) -> Option<(String, String)> {
    let path = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => url,
    };

    let segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>();

    let (namespace, id) = match segments.as_slice() {
        [.., namespace, id] => (namespace.to_string(), id.to_string()),
        [compact] => {
            let (prefix, id) = compact.split_once(':')?;
            (prefix.to_lowercase(), id.to_string())
        }
        [] => return None,
    };

    if namespace.is_empty() || id.is_empty() {
        return None;
    }

    Some((namespace, id))
}

/// Record the identifier a cross-reference URL points to.
pub fn add_cross_reference(annotation: &mut Annotation, url: &str) {
    match parse_cross_reference(url) {
        Some((namespace, id)) => annotation.entry(namespace).or_default().push(id),
        None => log::debug!("DEBUG: skipping cross-reference {}", url),
    }
}
