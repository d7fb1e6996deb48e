//! Minimal scanner for the flat XML payloads the RTMS endpoints emit.
//!
//! The responses are shallow: a header with a result code, a `totalCount`,
//! and a list of `<item>` elements whose children are plain `<tag>text</tag>`
//! pairs with no attributes or nesting that matters. A full XML parser is
//! more machinery than this wire format needs; this scanner extracts
//! first-occurrence tag text and item blocks and decodes the five standard
//! entities.

use crate::Record;

/// Text content of the first `<tag>...</tag>` occurrence, entity-decoded
/// and trimmed. Returns `None` when the tag is absent or unclosed.
pub fn text_of(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let rest = xml.get(start..)?;
    let end = rest.find(&close)?;
    Some(decode_entities(rest.get(..end)?.trim()))
}

/// Extract every `<item>...</item>` block as a [`Record`] of its child
/// elements. Children are taken as string fields; empty elements become
/// empty strings.
pub fn items(xml: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<item>") {
        let Some(after_open) = rest.get(start + "<item>".len()..) else {
            break;
        };
        let Some(end) = after_open.find("</item>") else {
            break;
        };
        let Some(body) = after_open.get(..end) else {
            break;
        };
        records.push(fields_of(body));
        match after_open.get(end + "</item>".len()..) {
            Some(r) => rest = r,
            None => break,
        }
    }
    records
}

/// Scan the flat child elements of one item body.
fn fields_of(body: &str) -> Record {
    let mut record = Record::new();
    let mut rest = body;
    while let Some(lt) = rest.find('<') {
        let Some(after_lt) = rest.get(lt + 1..) else {
            break;
        };
        let Some(gt) = after_lt.find('>') else {
            break;
        };
        let Some(raw_name) = after_lt.get(..gt) else {
            break;
        };
        // Skip closing tags and comments; handle self-closing empties.
        if raw_name.starts_with('/') || raw_name.starts_with('!') {
            rest = after_lt.get(gt + 1..).unwrap_or("");
            continue;
        }
        if let Some(name) = raw_name.strip_suffix('/') {
            record.insert(
                name.trim().to_string(),
                serde_json::Value::String(String::new()),
            );
            rest = after_lt.get(gt + 1..).unwrap_or("");
            continue;
        }
        let name = raw_name
            .split_whitespace()
            .next()
            .unwrap_or(raw_name)
            .to_string();
        let Some(after_open) = after_lt.get(gt + 1..) else {
            break;
        };
        let close = format!("</{name}>");
        let Some(end) = after_open.find(&close) else {
            // Unclosed element: stop scanning this item rather than guess.
            break;
        };
        let text = after_open.get(..end).unwrap_or("").trim();
        record.insert(name, serde_json::Value::String(decode_entities(text)));
        rest = after_open.get(end + close.len()..).unwrap_or("");
    }
    record
}

/// Decode the five predefined XML entities.
fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<response>
      <header><resultCode>000</resultCode><resultMsg>OK</resultMsg></header>
      <body>
        <items>
          <item>
            <dealAmount> 82,500 </dealAmount>
            <aptNm>래미안</aptNm>
            <excluUseAr>84.97</excluUseAr>
            <dealDay>12</dealDay>
          </item>
          <item>
            <dealAmount>41,000</dealAmount>
            <aptNm>A &amp; B 타워</aptNm>
            <rgstDate/>
          </item>
        </items>
        <totalCount>2</totalCount>
      </body>
    </response>"#;

    #[test]
    fn text_of_reads_header_fields() {
        assert_eq!(text_of(SAMPLE, "resultCode").as_deref(), Some("000"));
        assert_eq!(text_of(SAMPLE, "totalCount").as_deref(), Some("2"));
        assert_eq!(text_of(SAMPLE, "missing"), None);
    }

    #[test]
    fn items_extracts_all_blocks() {
        let records = items(SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["dealAmount"], "82,500");
        assert_eq!(records[0]["aptNm"], "래미안");
        assert_eq!(records[1]["dealAmount"], "41,000");
    }

    #[test]
    fn entities_are_decoded() {
        let records = items(SAMPLE);
        assert_eq!(records[1]["aptNm"], "A & B 타워");
    }

    #[test]
    fn self_closing_elements_become_empty_strings() {
        let records = items(SAMPLE);
        assert_eq!(records[1]["rgstDate"], "");
    }

    #[test]
    fn no_items_yields_empty_vec() {
        let xml = "<response><body><items></items><totalCount>0</totalCount></body></response>";
        assert!(items(xml).is_empty());
    }

    #[test]
    fn unclosed_item_does_not_loop() {
        let xml = "<items><item><a>1</a>";
        assert!(items(xml).is_empty());
    }
}
