/// Expand environment variable references in a configured path.
///
/// Understands `%VAR%`, `${VAR}` and `$VAR`. Unknown `%VAR%` references are
/// left as written; unknown `$` references expand to nothing, as a shell
/// would. Separators are normalized for the current OS.
pub fn expand_path(path: &str) -> String {
    let expanded = expand_unix_vars(&expand_windows_vars(path));
    normalize_separators(&expanded)
}

fn expand_windows_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find('%') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        result.push('%');
                        result.push_str(name);
                        result.push('%');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                result.push('%');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn expand_unix_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(start) = rest.find('$') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let (name, remainder) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], &braced[end + 1..]),
                None => {
                    result.push('$');
                    rest = after;
                    continue;
                }
            }
        } else {
            let end = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
            (&after[..end], &after[end..])
        };

        if name.is_empty() {
            result.push('$');
        } else if let Ok(value) = std::env::var(name) {
            result.push_str(&value);
        }
        rest = remainder;
    }
    result.push_str(rest);
    result
}

fn normalize_separators(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.to_string()
    }
}
