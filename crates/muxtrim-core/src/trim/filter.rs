//! Streaming filter over a `makepri dump /dt detailed` document.
//!
//! The dump nests named resources at a fixed depth:
//!
//! ```text
//! <PriInfo>
//!   <ResourceMap>
//!     <ResourceMapSubtree>
//!       <ResourceMapSubtree>
//!         <ResourceMapSubtree>
//!           <NamedResource name="...">
//!             <Candidate ...>
//!               <Base64Value>...</Base64Value>
//! ```
//!
//! Matching resources get every candidate payload replaced with
//! [`BLANK_PAYLOAD`]. All other events are copied through unchanged, so a
//! document with no matches serializes back to the same bytes.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::debug;

use super::TrimError;

/// Base64 for a single space character.
pub const BLANK_PAYLOAD: &str = "IA==";

/// Compiled XAML markup.
pub const MARKUP_SUFFIX: &str = ".xbf";

/// Name fragments of the legacy and compact platform variants. Only the
/// 19H1 and 21H1 markup is kept (Windows 10 and Windows 11).
pub const LEGACY_VARIANTS: [&str; 7] = ["compact", "Compact", "v1", "rs2", "rs3", "rs4", "rs5"];

const RESOURCE_PATH: [&[u8]; 5] = [
    b"ResourceMap",
    b"ResourceMapSubtree",
    b"ResourceMapSubtree",
    b"ResourceMapSubtree",
    b"NamedResource",
];
const PAYLOAD_PATH: [&[u8]; 2] = [b"Candidate", b"Base64Value"];

/// Ordered set of name fragments that mark a resource for blanking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denylist(Vec<String>);

impl Denylist {
    /// Fragments are matched in the order given.
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fragments.into_iter().map(Into::into).collect())
    }

    /// First fragment contained in `name`, in list order.
    pub fn first_match(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .map(String::as_str)
            .find(|fragment| name.contains(fragment))
    }

    /// The fragments, in match order.
    pub fn fragments(&self) -> &[String] {
        &self.0
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::new(LEGACY_VARIANTS)
    }
}

/// Fragment that makes `name` a trim target, if any.
pub fn trim_target<'a>(name: &str, denylist: &'a Denylist) -> Option<&'a str> {
    if !name.ends_with(MARKUP_SUFFIX) {
        return None;
    }
    denylist.first_match(name)
}

/// Per-index counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrimStats {
    /// `NamedResource` elements at the resource depth.
    pub named_resources: usize,
    /// Of those, names ending in [`MARKUP_SUFFIX`].
    pub markup_resources: usize,
    /// Matching resources whose payload changed.
    pub blanked: usize,
    /// Matching resources that already carried only [`BLANK_PAYLOAD`].
    pub already_blank: usize,
}

impl TrimStats {
    /// Resources the denylist matched, blanked or not.
    pub fn matched(&self) -> usize {
        self.blanked + self.already_blank
    }

    /// Add `other`'s counters to these.
    pub fn merge(&mut self, other: &Self) {
        self.named_resources += other.named_resources;
        self.markup_resources += other.markup_resources;
        self.blanked += other.blanked;
        self.already_blank += other.already_blank;
    }
}

struct Target {
    changed: bool,
}

/// Blank every matching resource payload in a dump document.
///
/// All `Candidate/Base64Value` payloads of a matching resource are blanked,
/// not only the first one, so no qualifier variant keeps the markup.
pub fn filter_dump(xml: &str, denylist: &Denylist) -> Result<(String, TrimStats), TrimError> {
    let (bom, body) = match xml.strip_prefix('\u{feff}') {
        Some(rest) => ("\u{feff}", rest),
        None => ("", xml),
    };

    let mut reader = Reader::from_str(body);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut stats = TrimStats::default();

    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut target: Option<Target> = None;
    // Original text of the payload being replaced.
    let mut payload: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                stack.push(e.name().as_ref().to_vec());
                if payload.is_some() {
                    continue;
                }
                if at_resource(&stack) {
                    target = inspect_resource(&e, denylist, &mut stats)?;
                } else if target.is_some() && at_payload(&stack) {
                    payload = Some(String::new());
                }
                writer.write_event(Event::Start(e))?;
            }
            Event::End(e) => {
                let closes_payload = payload.is_some() && at_payload(&stack);
                let closes_resource = at_resource(&stack);
                stack.pop();

                if closes_payload {
                    let original = payload.take().unwrap_or_default();
                    if original.trim() != BLANK_PAYLOAD {
                        if let Some(t) = target.as_mut() {
                            t.changed = true;
                        }
                    }
                    writer.write_event(Event::Text(BytesText::new(BLANK_PAYLOAD)))?;
                } else if payload.is_some() {
                    continue;
                }

                if closes_resource {
                    if let Some(t) = target.take() {
                        if t.changed {
                            stats.blanked += 1;
                        } else {
                            stats.already_blank += 1;
                        }
                    }
                }
                writer.write_event(Event::End(e))?;
            }
            Event::Empty(e) => {
                if payload.is_some() {
                    continue;
                }
                stack.push(e.name().as_ref().to_vec());
                if at_resource(&stack) {
                    // A resource without candidates has nothing to blank.
                    inspect_resource(&e, denylist, &mut stats)?;
                    stack.pop();
                    writer.write_event(Event::Empty(e))?;
                } else if let (Some(t), true) = (target.as_mut(), at_payload(&stack)) {
                    t.changed = true;
                    stack.pop();
                    writer.write_event(Event::Start(e.clone()))?;
                    writer.write_event(Event::Text(BytesText::new(BLANK_PAYLOAD)))?;
                    writer.write_event(Event::End(e.to_end()))?;
                } else {
                    stack.pop();
                    writer.write_event(Event::Empty(e))?;
                }
            }
            Event::Text(t) => match payload.as_mut() {
                Some(buf) => buf.push_str(&String::from_utf8_lossy(&t)),
                None => writer.write_event(Event::Text(t))?,
            },
            Event::CData(c) => match payload.as_mut() {
                Some(buf) => buf.push_str(&String::from_utf8_lossy(&c)),
                None => writer.write_event(Event::CData(c))?,
            },
            other => {
                if payload.is_none() {
                    writer.write_event(other)?;
                }
            }
        }
    }

    let body = String::from_utf8(writer.into_inner())?;
    Ok((format!("{bom}{body}"), stats))
}

fn at_resource(stack: &[Vec<u8>]) -> bool {
    stack.len() == RESOURCE_PATH.len() + 1
        && stack[1..]
            .iter()
            .zip(RESOURCE_PATH)
            .all(|(name, expected)| name.as_slice() == expected)
}

fn at_payload(stack: &[Vec<u8>]) -> bool {
    let depth = RESOURCE_PATH.len() + 1;
    stack.len() == depth + PAYLOAD_PATH.len()
        && at_resource(&stack[..depth])
        && stack[depth..]
            .iter()
            .zip(PAYLOAD_PATH)
            .all(|(name, expected)| name.as_slice() == expected)
}

fn inspect_resource(
    e: &BytesStart<'_>,
    denylist: &Denylist,
    stats: &mut TrimStats,
) -> Result<Option<Target>, TrimError> {
    stats.named_resources += 1;

    let name = e
        .try_get_attribute("name")?
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()
        .map_err(quick_xml::Error::from)?
        .unwrap_or_default();
    if !name.ends_with(MARKUP_SUFFIX) {
        return Ok(None);
    }
    stats.markup_resources += 1;

    Ok(trim_target(&name, denylist).map(|fragment| {
        debug!(resource = %name, fragment, "blanking resource");
        Target { changed: false }
    }))
}
