use recap_common::{StatusKind, StatusRecord};

/// Returned when there are no records to describe.
pub const EMPTY_PLACEHOLDER: &str = "no recorded status";

/// Rendered in place of a blank title.
pub const UNTITLED: &str = "untitled";

const HEADER: &str = "Current work status:";

/// Section order and headers.
pub(crate) const SECTIONS: [(StatusKind, &str); 3] = [
    (StatusKind::Ongoing, "Ongoing:"),
    (StatusKind::Planned, "Planned:"),
    (StatusKind::Completed, "Completed:"),
];

/// Render records as grouped text for the prompt.
///
/// Records are grouped by kind (ongoing, planned, completed); within a group
/// they keep input order. Empty groups are left out.
pub fn build_status_description(records: &[StatusRecord]) -> String {
    if records.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }

    let mut out = String::from(HEADER);
    for (kind, header) in SECTIONS {
        let mut group = records.iter().filter(|r| r.kind == kind).peekable();
        if group.peek().is_none() {
            continue;
        }
        out.push('\n');
        out.push_str(header);
        for record in group {
            out.push_str(&format!("\n- {} ({})", display_title(record), progress_label(record)));
            let description = record.description.trim();
            if !description.is_empty() {
                out.push_str("\n  ");
                out.push_str(description);
            }
        }
    }
    out
}

pub(crate) fn display_title(record: &StatusRecord) -> &str {
    let title = record.title.trim();
    if title.is_empty() { UNTITLED } else { title }
}

fn progress_label(record: &StatusRecord) -> &'static str {
    match (record.kind, record.completed) {
        (_, true) | (StatusKind::Completed, _) => "done",
        (StatusKind::Ongoing, false) => "in progress",
        (StatusKind::Planned, false) => "planned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, kind: StatusKind) -> StatusRecord {
        StatusRecord::new(id, title, "", kind)
    }

    #[test]
    fn empty_input_is_placeholder() {
        assert_eq!(build_status_description(&[]), EMPTY_PLACEHOLDER);
    }

    #[test]
    fn groups_by_kind_in_section_order() {
        let records = vec![
            record("1", "Ship v2", StatusKind::Completed),
            record("2", "Learn X", StatusKind::Ongoing),
            record("3", "Try Y", StatusKind::Planned),
            record("4", "Read Z", StatusKind::Ongoing),
        ];
        let text = build_status_description(&records);

        let pos = |needle: &str| text.find(needle).unwrap();
        assert!(pos("Ongoing:") < pos("Learn X"));
        assert!(pos("Learn X") < pos("Read Z"));
        assert!(pos("Read Z") < pos("Planned:"));
        assert!(pos("Planned:") < pos("Try Y"));
        assert!(pos("Try Y") < pos("Completed:"));
        assert!(pos("Completed:") < pos("Ship v2"));
    }

    #[test]
    fn every_title_appears_exactly_once() {
        let records = vec![
            record("1", "Alpha", StatusKind::Ongoing),
            record("2", "Beta", StatusKind::Planned),
            record("3", "Gamma", StatusKind::Completed),
        ];
        let text = build_status_description(&records);
        for title in ["Alpha", "Beta", "Gamma"] {
            assert_eq!(text.matches(title).count(), 1, "{title} in {text}");
        }
    }

    #[test]
    fn empty_sections_are_omitted() {
        let text = build_status_description(&[record("1", "Learn X", StatusKind::Ongoing)]);
        assert!(text.contains("Ongoing:"));
        assert!(!text.contains("Planned:"));
        assert!(!text.contains("Completed:"));
    }

    #[test]
    fn description_line_follows_title() {
        let rec = StatusRecord::new("1", "Learn X", "  chapter 3  ", StatusKind::Ongoing);
        let text = build_status_description(&[rec]);
        assert!(text.ends_with("- Learn X (in progress)\n  chapter 3"));
    }

    #[test]
    fn blank_title_renders_placeholder() {
        let text = build_status_description(&[record("1", "   ", StatusKind::Planned)]);
        assert!(text.contains("- untitled (planned)"));
    }

    #[test]
    fn completed_flag_overrides_label() {
        let mut rec = record("1", "Learn X", StatusKind::Ongoing);
        rec.completed = true;
        assert!(build_status_description(&[rec]).contains("- Learn X (done)"));
    }

    #[test]
    fn output_is_stable() {
        let records = vec![
            record("1", "Alpha", StatusKind::Ongoing),
            record("2", "Beta", StatusKind::Completed),
        ];
        assert_eq!(
            build_status_description(&records),
            build_status_description(&records)
        );
    }
}
