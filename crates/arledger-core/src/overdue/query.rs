//! Overdue invoice query.

use chrono::{Days, Local, NaiveDate};
use url::Url;

use crate::error::{Error, Result};

/// Filter parameter understood by the API.
pub const FILTER_PARAM: &str = "$filter";

/// Builds the invoice collection URL for a company file.
///
/// # Errors
///
/// Returns an error if `api_base` is not a valid URL.
pub fn invoice_endpoint(api_base: &str, company_file_id: &str) -> Result<Url> {
    let mut base = api_base.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(&format!("{company_file_id}/Sale/Invoice"))?)
}

/// Invoices with a balance above a threshold that fell due more than a
/// number of days ago.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverdueQuery {
    /// Balances at or below this amount are ignored.
    pub balance_threshold: f64,
    /// Invoices due on or before today minus this many days are overdue.
    pub days_over: u32,
}

impl OverdueQuery {
    /// Creates a query.
    #[must_use]
    pub const fn new(balance_threshold: f64, days_over: u32) -> Self {
        Self {
            balance_threshold,
            days_over,
        }
    }

    /// Latest due date still counted as overdue.
    ///
    /// # Errors
    ///
    /// Returns an error if the subtraction leaves the supported date range.
    pub fn cutoff(&self, today: NaiveDate) -> Result<NaiveDate> {
        today
            .checked_sub_days(Days::new(u64::from(self.days_over)))
            .ok_or_else(|| {
                Error::Config(format!(
                    "{} days before {today} is out of range",
                    self.days_over
                ))
            })
    }

    /// OData filter expression for `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cutoff date is out of range.
    pub fn filter(&self, today: NaiveDate) -> Result<String> {
        let cutoff = self.cutoff(today)?;
        Ok(format!(
            "BalanceDueAmount gt {}M and Terms/DueDate le datetime'{}'",
            decimal_literal(self.balance_threshold),
            cutoff.format("%Y-%m-%d")
        ))
    }

    /// Filtered URL as it would be built on `today`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cutoff date is out of range.
    pub fn url_on(&self, invoice_base: &Url, today: NaiveDate) -> Result<Url> {
        let filter = self.filter(today)?;
        let mut url = invoice_base.clone();
        url.query_pairs_mut().append_pair(FILTER_PARAM, &filter);
        Ok(url)
    }
}

/// Plain decimal notation with at least one fractional digit; OData decimal
/// literals have no exponent form.
fn decimal_literal(value: f64) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Filtered overdue-invoice URL as of the local date.
///
/// # Errors
///
/// Returns an error if the cutoff date is out of range.
pub fn build_overdue_url(invoice_base: &Url, balance_threshold: f64, days_over: u32) -> Result<Url> {
    OverdueQuery::new(balance_threshold, days_over).url_on(invoice_base, Local::now().date_naive())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base() -> Url {
        invoice_endpoint("https://ar2.api.myob.com/accountright", "0f1e2d3c").unwrap()
    }

    fn filter_of(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == FILTER_PARAM)
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_invoice_endpoint() {
        assert_eq!(
            base().as_str(),
            "https://ar2.api.myob.com/accountright/0f1e2d3c/Sale/Invoice"
        );
        assert_eq!(
            invoice_endpoint("https://ar2.api.myob.com/accountright/", "0f1e2d3c").unwrap(),
            base()
        );
    }

    #[test]
    fn test_sixty_days_before_march_fifteenth() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let url = OverdueQuery::new(0.0, 60).url_on(&base(), today).unwrap();

        assert_eq!(url.path(), "/accountright/0f1e2d3c/Sale/Invoice");
        assert_eq!(
            filter_of(&url),
            "BalanceDueAmount gt 0.0M and Terms/DueDate le datetime'2024-01-15'"
        );
    }

    #[test]
    fn test_fractional_threshold() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let filter = OverdueQuery::new(150.5, 0).filter(today).unwrap();
        assert_eq!(
            filter,
            "BalanceDueAmount gt 150.5M and Terms/DueDate le datetime'2024-01-10'"
        );
    }

    #[test]
    fn test_large_threshold_has_no_exponent() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let filter = OverdueQuery::new(1e16, 0).filter(today).unwrap();
        assert!(filter.starts_with("BalanceDueAmount gt 10000000000000000.0M and"));

        assert_eq!(decimal_literal(2.5e17), "250000000000000000.0");
        assert_eq!(decimal_literal(0.000_01), "0.00001");
        assert_eq!(decimal_literal(100.0), "100.0");
    }

    #[test]
    fn test_cutoff_crosses_year_boundary() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let cutoff = OverdueQuery::new(0.0, 10).cutoff(today).unwrap();
        assert_eq!(cutoff, NaiveDate::from_ymd_opt(2023, 12, 26).unwrap());
    }

    #[test]
    fn test_build_overdue_url_uses_local_date() {
        let url = build_overdue_url(&base(), 0.0, 60).unwrap();
        let expected = OverdueQuery::new(0.0, 60)
            .filter(Local::now().date_naive())
            .unwrap();
        assert_eq!(filter_of(&url), expected);
    }

    proptest! {
        #[test]
        fn cutoff_is_exactly_days_over_earlier(
            offset in 0i64..40_000,
            days_over in 0u32..3_650,
        ) {
            let today = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + chrono::Duration::days(offset);
            let query = OverdueQuery::new(0.0, days_over);
            let cutoff = query.cutoff(today).unwrap();

            prop_assert_eq!((today - cutoff).num_days(), i64::from(days_over));

            let url = query.url_on(&base(), today).unwrap();
            let expected_date = format!("datetime'{}'", cutoff.format("%Y-%m-%d"));
            prop_assert!(filter_of(&url).ends_with(&expected_date));
        }
    }
}
