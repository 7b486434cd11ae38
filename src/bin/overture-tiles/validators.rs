use overture_tiles::MAX_ZOOM;

pub fn is_layer_name(v: &str) -> Result<String, String> {
    if v.is_empty() {
        return Err("must not be empty".to_owned());
    }

    if !v
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("may only contain letters, digits, `_` and `-`".to_owned());
    }

    Ok(v.to_owned())
}

pub fn is_zoom(v: &str) -> Result<u8, String> {
    let val = v.parse::<u8>().map_err(|_| "must be numeric".to_owned())?;

    if val > MAX_ZOOM {
        return Err(format!("must be <= {}", MAX_ZOOM));
    }

    Ok(val)
}

pub fn is_seconds(v: &str) -> Result<u64, String> {
    v.parse::<u64>().map_err(|_| "must be numeric".to_owned())
}
