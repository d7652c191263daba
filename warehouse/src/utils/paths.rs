/// Directory name used for a null partition value.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Builds Hive-style partition paths below a table directory:
/// `{table}/{col}={value}/.../{file}`.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    table_path: String,
    partitions: Vec<(String, Option<String>)>,
}

impl PathBuilder {
    pub fn new(table_path: &str) -> Self {
        Self {
            table_path: table_path.trim_matches('/').to_string(),
            partitions: Vec::new(),
        }
    }

    pub fn with_partition(mut self, column: &str, value: Option<&str>) -> Self {
        self.partitions
            .push((column.to_string(), value.map(str::to_string)));
        self
    }

    pub fn build_partition_path(&self) -> String {
        let mut path = self.table_path.clone();
        for (column, value) in &self.partitions {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&partition_segment(column, value.as_deref()));
        }
        path
    }

    pub fn build_file_path(&self, filename: &str) -> String {
        let dir = self.build_partition_path();
        if dir.is_empty() {
            filename.to_string()
        } else {
            format!("{}/{}", dir, filename)
        }
    }
}

pub fn partition_segment(column: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!("{}={}", escape_path_name(column), escape_path_name(v)),
        _ => format!("{}={}", escape_path_name(column), DEFAULT_PARTITION),
    }
}

pub fn part_file_name(index: usize) -> String {
    format!("part-{:05}.parquet", index)
}

fn needs_escaping(c: char) -> bool {
    c.is_control()
        || matches!(
            c,
            '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '{' | '[' | ']' | '^'
        )
}

/// Percent-escapes characters that would break a `col=value` directory name.
pub fn escape_path_name(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        if needs_escaping(c) {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        } else {
            escaped.push(c);
        }
    }
    escaped
}

pub fn unescape_path_name(name: &str) -> String {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
