use serde::Deserialize;
use tracing::debug;

use super::utils::clean_opt;

/// Contact info exploded out of the raw `contact_info` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    pub email: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContact {
    #[serde(default)]
    mailing_address: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Parse `{"mailing_address": "...", "email": "..."}`.
///
/// The source mixes JSON with Python dict literals (single quotes, `None`),
/// so a failed JSON parse is retried after requoting. Anything still
/// unparseable yields an all-missing `Contact`.
pub fn parse_contact_info(raw: Option<&str>) -> Contact {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Contact::default();
    };

    let parsed = serde_json::from_str::<RawContact>(text)
        .or_else(|_| serde_json::from_str::<RawContact>(&python_literal_to_json(text)));

    match parsed {
        Ok(rc) => {
            let (street, city, state, zip_code) = split_mailing_address(rc.mailing_address.as_deref());
            Contact {
                email: clean_opt(rc.email.as_deref()),
                street,
                city,
                state,
                zip_code,
            }
        }
        Err(e) => {
            debug!(error = %e, "unparseable contact_info");
            Contact::default()
        }
    }
}

type AddressParts = (Option<String>, Option<String>, Option<String>, Option<String>);

/// `"street, city, state, zip"` → parts. Split from the right so commas inside
/// the street survive; shorter addresses fill left to right.
pub fn split_mailing_address(raw: Option<&str>) -> AddressParts {
    let Some(addr) = clean_opt(raw) else {
        return (None, None, None, None);
    };

    let parts: Vec<&str> = addr.split(',').collect();
    if parts.len() >= 4 {
        let mut rev = addr.rsplitn(4, ',');
        let zip = clean_opt(rev.next());
        let state = clean_opt(rev.next());
        let city = clean_opt(rev.next());
        let street = clean_opt(rev.next());
        (street, city, state, zip)
    } else {
        let mut it = parts.into_iter();
        (
            clean_opt(it.next()),
            clean_opt(it.next()),
            clean_opt(it.next()),
            None,
        )
    }
}

/// Requote a Python literal as JSON: single-quoted strings become
/// double-quoted, `None`/`True`/`False` become their JSON spellings.
fn python_literal_to_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    // quote char of the string we are inside, if any
    let mut in_str: Option<char> = None;
    let mut bare = String::new();

    let flush_bare = |bare: &mut String, out: &mut String| {
        match bare.as_str() {
            "None" => out.push_str("null"),
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            other => out.push_str(other),
        }
        bare.clear();
    };

    while let Some(c) = chars.next() {
        match in_str {
            Some(q) => match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        if next == '\'' {
                            out.push('\'');
                        } else {
                            out.push('\\');
                            out.push(next);
                        }
                    }
                }
                '"' if q == '\'' => out.push_str("\\\""),
                c if c == q => {
                    out.push('"');
                    in_str = None;
                }
                c => out.push(c),
            },
            None => {
                if c.is_alphanumeric() || c == '_' {
                    bare.push(c);
                    continue;
                }
                flush_bare(&mut bare, &mut out);
                if c == '\'' || c == '"' {
                    in_str = Some(c);
                    out.push('"');
                } else {
                    out.push(c);
                }
            }
        }
    }
    flush_bare(&mut bare, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_contact_is_exploded() {
        let c = parse_contact_info(Some(
            r#"{"mailing_address": "303 N Timber Key, Irondale, Wisconsin, 84736", "email": "annabelle_avery9376@woohoo.com"}"#,
        ));
        assert_eq!(c.email.as_deref(), Some("annabelle_avery9376@woohoo.com"));
        assert_eq!(c.street.as_deref(), Some("303 N Timber Key"));
        assert_eq!(c.city.as_deref(), Some("Irondale"));
        assert_eq!(c.state.as_deref(), Some("Wisconsin"));
        assert_eq!(c.zip_code.as_deref(), Some("84736"));
    }

    #[test]
    fn python_literal_contact_is_accepted() {
        let c = parse_contact_info(Some(
            "{'mailing_address': '12 O\\'Brien Rd, Apt 4, Salem, Oregon, 97301', 'email': None}",
        ));
        assert_eq!(c.street.as_deref(), Some("12 O'Brien Rd, Apt 4"));
        assert_eq!(c.city.as_deref(), Some("Salem"));
        assert_eq!(c.zip_code.as_deref(), Some("97301"));
        assert_eq!(c.email, None);
    }

    #[test]
    fn garbage_contact_is_all_missing() {
        assert_eq!(parse_contact_info(Some("not a dict")), Contact::default());
        assert_eq!(parse_contact_info(None), Contact::default());
    }

    #[test]
    fn short_address_fills_left_to_right() {
        assert_eq!(
            split_mailing_address(Some("1 Main St, Springfield")),
            (Some("1 Main St".into()), Some("Springfield".into()), None, None)
        );
    }
}
