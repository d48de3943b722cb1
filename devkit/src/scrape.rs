/*!
Lecture du format texte Prometheus pour les assertions de tests

Suffisant pour ce que sert l'exporter: commentaires `# HELP` / `# TYPE`,
échantillons `name{label="value",...} value`, valeurs `+Inf` / `NaN`.
*/

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Échantillons d'un scrape, dans l'ordre d'exposition
#[derive(Debug, Clone, Default)]
pub struct Scrape {
    samples: Vec<Sample>,
}

impl Scrape {
    pub fn parse(text: &str) -> Result<Self> {
        let samples = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| parse_sample(line).with_context(|| format!("bad sample line: {line}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { samples })
    }

    /// GET `url` et parse la réponse
    pub async fn fetch(url: &str) -> Result<Self> {
        let body = crate::http_stub::local_client()?
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Self::parse(&body)
    }

    pub fn samples(&self, name: &str) -> Vec<&Sample> {
        self.samples.iter().filter(|s| s.name == name).collect()
    }

    /// Valeur de l'échantillon dont le jeu de labels est exactement `labels`
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|s| {
                s.name == name
                    && s.labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(k, v)| s.labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|s| s.value)
    }

    /// Toutes les valeurs prises par `label` pour la métrique `name`
    pub fn label_values(&self, name: &str, label: &str) -> Vec<&str> {
        self.samples(name)
            .into_iter()
            .filter_map(|s| s.labels.get(label).map(String::as_str))
            .collect()
    }
}

fn parse_sample(line: &str) -> Result<Sample> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| anyhow!("missing value"))?;
    let name = line[..name_end].to_string();

    let (labels, rest) = match line[name_end..].strip_prefix('{') {
        Some(inner) => parse_labels(inner)?,
        None => (BTreeMap::new(), &line[name_end..]),
    };

    // Un timestamp optionnel peut suivre la valeur
    let value = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("missing value"))?;

    Ok(Sample {
        name,
        labels,
        value: parse_value(value)?,
    })
}

/// Parse après `{`; renvoie les labels et le reste de la ligne après `}`
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str)> {
    let mut labels = BTreeMap::new();
    let mut chars = input.char_indices();

    loop {
        let (start, first) = loop {
            match chars.next() {
                Some((_, c)) if c == ',' || c.is_whitespace() => continue,
                Some(found) => break found,
                None => bail!("unterminated label set"),
            }
        };
        if first == '}' {
            return Ok((labels, &input[start + 1..]));
        }

        let mut key = String::from(first);
        loop {
            match chars.next() {
                Some((_, '=')) => break,
                Some((_, c)) => key.push(c),
                None => bail!("label {key} has no value"),
            }
        }

        if !matches!(chars.next(), Some((_, '"'))) {
            bail!("label {key} value is not quoted");
        }

        let mut value = String::new();
        loop {
            match chars.next() {
                Some((_, '"')) => break,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, escaped)) => value.push(escaped),
                    None => bail!("dangling escape in label {key}"),
                },
                Some((_, c)) => value.push(c),
                None => bail!("unterminated value for label {key}"),
            }
        }

        labels.insert(key.trim().to_string(), value);
    }
}

fn parse_value(raw: &str) -> Result<f64> {
    // L'encodeur Rust écrit `inf`, le format de référence `+Inf`
    match raw.to_ascii_lowercase().as_str() {
        "+inf" | "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        _ => raw.parse().with_context(|| format!("invalid sample value {raw:?}")),
    }
}
