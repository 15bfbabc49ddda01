/// Collapses every whitespace run (newlines and ideographic spaces included)
/// into a single space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits block text into trimmed, non-empty lines.
pub fn non_empty_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Index primary key for a storage key: path separators and the document
/// suffix are removed, so the same key always maps to the same id.
pub fn document_id_for_key(key: &str, document_suffix: &str) -> String {
    let without_separators = key.replace('/', "");
    if document_suffix.is_empty() {
        return without_separators;
    }
    without_separators.replace(document_suffix, "")
}

/// Storage notifications carry form-encoded keys (`+` for space, `%XX` for
/// bytes). Keys that do not decode to UTF-8 are returned unchanged.
pub fn decode_storage_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Inverse of [`decode_storage_key`] for keys built locally, such as a
/// directory backfill.
pub fn encode_storage_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
