use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One sales transaction as it appears in the source file, headers included.
///
/// The source carries a known defect: the net sales amount is stored under a
/// leading-space header (` Sales`). It is captured here under any of its
/// observed spellings and left optional; the schema normalizer resolves it
/// into a definite `net_sales`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Segment")]
    pub segment: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "Product")]
    pub product: String,
    #[serde(rename = "Discount Band")]
    pub discount_band: Option<String>,
    #[serde(rename = "Units Sold", deserialize_with = "amount::required")]
    pub units_sold: f64,
    #[serde(rename = "Manufacturing Price", deserialize_with = "amount::required")]
    pub manufacturing_price: f64,
    #[serde(rename = "Sale Price", deserialize_with = "amount::required")]
    pub sale_price: f64,
    #[serde(rename = "Gross Sales", deserialize_with = "amount::required")]
    pub gross_sales: f64,
    #[serde(rename = "Discounts", default, deserialize_with = "amount::defaulted")]
    pub discounts: f64,
    #[serde(
        rename = " Sales",
        alias = "Sales",
        alias = "Net_Sales",
        default,
        deserialize_with = "amount::optional"
    )]
    pub sales: Option<f64>,
    #[serde(rename = "COGS", deserialize_with = "amount::required")]
    pub cogs: f64,
    #[serde(rename = "Profit", deserialize_with = "amount::required")]
    pub profit: f64,
    #[serde(rename = "Date", deserialize_with = "date::flexible")]
    pub transaction_date: NaiveDate,
    #[serde(rename = "Month Number")]
    pub month_number: u32,
    #[serde(rename = "Month Name")]
    pub month_name: String,
    #[serde(rename = "Year")]
    pub year: i32,
}

impl RawRecord {
    /// Content fingerprint over every observed column, used for stable
    /// first-seen duplicate removal.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.segment,
            self.country,
            self.product,
            self.discount_band.as_deref().unwrap_or(""),
            self.units_sold,
            self.manufacturing_price,
            self.sale_price,
            self.gross_sales,
            self.discounts,
            self.sales.map(|v| v.to_string()).unwrap_or_default(),
            self.cogs,
            self.profit,
            self.transaction_date,
            self.month_number,
            self.month_name,
            self.year,
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A raw record after schema repair: the sales amount is definite under its
/// corrected name and the discount band carries the `"None"` sentinel instead
/// of a true null.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRecord {
    pub segment: String,
    pub country: String,
    pub product: String,
    pub discount_band: String,
    pub units_sold: f64,
    pub manufacturing_price: f64,
    pub sale_price: f64,
    pub gross_sales: f64,
    pub discounts: f64,
    pub net_sales: f64,
    pub cogs: f64,
    pub profit: f64,
    pub transaction_date: NaiveDate,
    pub month_number: u32,
    pub month_name: String,
    pub year: i32,
}

impl NormalizedRecord {
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.segment,
            self.country,
            self.product,
            self.discount_band,
            self.units_sold,
            self.manufacturing_price,
            self.sale_price,
            self.gross_sales,
            self.discounts,
            self.net_sales,
            self.cogs,
            self.profit,
            self.transaction_date,
            self.month_number,
            self.month_name,
            self.year,
        );

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

mod amount {
    use serde::{de, Deserialize, Deserializer};

    /// Parses a currency-formatted amount. Accounting exports render values
    /// as `$1,234.56`, `(1,234)` for negatives, and `$-` for zero.
    pub(super) fn parse(raw: &str) -> Result<Option<f64>, String> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(None);
        }

        let negative = s.starts_with('(') && s.ends_with(')');
        let cleaned: String = s
            .trim_start_matches('(')
            .trim_end_matches(')')
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | ' '))
            .collect();

        if cleaned.is_empty() || cleaned == "-" {
            return Ok(Some(0.0));
        }

        match cleaned.parse::<f64>() {
            Ok(v) => Ok(Some(if negative { -v } else { v })),
            Err(_) => Err(format!("not a numeric amount: '{raw}'")),
        }
    }

    pub(super) fn required<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        match parse(&raw) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(de::Error::custom("required numeric amount is empty")),
            Err(e) => Err(de::Error::custom(e)),
        }
    }

    pub(super) fn optional<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse(&s).map_err(de::Error::custom),
        }
    }

    pub(super) fn defaulted<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(0.0),
            Some(s) => Ok(parse(&s).map_err(de::Error::custom)?.unwrap_or(0.0)),
        }
    }
}

mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer};

    const FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

    pub(super) fn flexible<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.trim();
        for format in FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
                return Ok(date);
            }
        }
        Err(de::Error::custom(format!("unrecognized date: '{raw}'")))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn parses_currency_formatted_amounts() {
        assert_eq!(amount::parse("$1,234.56").unwrap(), Some(1234.56));
        assert_eq!(amount::parse("(1,234)").unwrap(), Some(-1234.0));
        assert_eq!(amount::parse("$-").unwrap(), Some(0.0));
        assert_eq!(amount::parse("  32370.00 ").unwrap(), Some(32370.0));
        assert_eq!(amount::parse("").unwrap(), None);
        assert!(amount::parse("abc").is_err());
    }

    #[test]
    fn fingerprint_is_stable_and_content_sensitive() {
        let record = sample_raw();
        assert_eq!(record.fingerprint(), record.fingerprint());

        let mut other = sample_raw();
        other.profit += 1.0;
        assert_ne!(record.fingerprint(), other.fingerprint());
    }

    pub(crate) fn sample_raw() -> RawRecord {
        RawRecord {
            segment: "Government".to_string(),
            country: "Canada".to_string(),
            product: "Carretera".to_string(),
            discount_band: None,
            units_sold: 1618.5,
            manufacturing_price: 3.0,
            sale_price: 20.0,
            gross_sales: 32370.0,
            discounts: 0.0,
            sales: Some(32370.0),
            cogs: 16185.0,
            profit: 16185.0,
            transaction_date: NaiveDate::from_ymd_opt(2014, 1, 1).unwrap(),
            month_number: 1,
            month_name: "January".to_string(),
            year: 2014,
        }
    }
}
