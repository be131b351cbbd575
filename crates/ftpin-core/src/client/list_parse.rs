//! Parse `LIST` output.
//!
//! Servers answer `LIST` with free-form text. Two layouts cover practically
//! every server in the wild: Unix `ls -l` and MS-DOS/IIS. Lines matching
//! neither (`total 12`, banners) are dropped.

use super::{EntryKind, RemoteEntry};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn parse_list_output(text: &str) -> Vec<RemoteEntry> {
    text.lines().filter_map(parse_list_line).collect()
}

pub fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let first = line.as_bytes()[0];
    if first.is_ascii_digit() {
        return parse_dos(line);
    }
    parse_unix(line)
}

/// Whitespace-separated fields with the byte offset each one starts at.
fn fields(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                out.push((s, &line[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &line[s..]));
    }
    out
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_month(s: &str) -> bool {
    MONTHS.contains(&s.to_ascii_lowercase().as_str())
}

// drwxr-xr-x   2 owner group     4096 Oct 14 14:52 name with spaces
// lrwxrwxrwx   1 owner group        9 Oct 14  2025 latest -> data.csv
// -rw-r--r--   1 owner            120 Oct 14 14:52 no-group.csv
fn parse_unix(line: &str) -> Option<RemoteEntry> {
    let fields = fields(line);
    let perms = fields.first()?.1;
    if perms.len() < 10 {
        return None;
    }
    let kind = match perms.as_bytes()[0] {
        b'-' => EntryKind::File,
        b'd' => EntryKind::Directory,
        b'l' => EntryKind::Link,
        _ => EntryKind::Other,
    };
    // size, month, day, then time-or-year; the name starts after those.
    // Anchoring on the size keeps a month-like owner or group from matching.
    let month = (3..fields.len().min(7)).find(|&i| {
        is_month(fields[i].1) && is_number(fields[i - 1].1) && fields.get(i + 1).is_some_and(|d| is_number(d.1))
    })?;
    let name_field = fields.get(month + 3)?;
    let mut name = &line[name_field.0..];
    if kind == EntryKind::Link {
        if let Some((link, _target)) = name.split_once(" -> ") {
            name = link;
        }
    }
    if name.is_empty() {
        return None;
    }
    Some(RemoteEntry::new(name, kind))
}

// 10-14-26  02:52PM       <DIR>          reports
// 10-14-26  02:52PM                 1204 sample 01.csv
fn parse_dos(line: &str) -> Option<RemoteEntry> {
    let fields = fields(line);
    if fields.len() < 4 || !fields[0].1.contains('-') {
        return None;
    }
    let kind = if fields[2].1.eq_ignore_ascii_case("<DIR>") {
        EntryKind::Directory
    } else if fields[2].1.bytes().all(|b| b.is_ascii_digit()) {
        EntryKind::File
    } else {
        return None;
    };
    Some(RemoteEntry::new(&line[fields[3].0..], kind))
}
