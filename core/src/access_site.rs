//! Physical access-site visits. A volume fixture with no link to clients.

use crate::{
    config::AccessFixtureConfig,
    error::{SynthError, SynthResult},
    rng::StreamRng,
};
use chrono::{Days, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessSiteVisit {
    pub site: String,
    pub engagement_date: NaiveDate,
}

/// One row per configured visit, sites in config order.
pub fn generate_visits(
    config: &AccessFixtureConfig,
    rng: &mut StreamRng,
) -> SynthResult<Vec<AccessSiteVisit>> {
    let total: usize = config.sites.iter().map(|s| s.visits).sum();
    let mut visits = Vec::with_capacity(total);
    for site in &config.sites {
        for _ in 0..site.visits {
            let offset = rng.gen_range(0..u64::from(config.window_days));
            let engagement_date = config
                .window_start
                .checked_add_days(Days::new(offset))
                .ok_or_else(|| {
                    SynthError::config(
                        "access_sites.window_days",
                        format!("{} + {offset} days is not a valid date", config.window_start),
                    )
                })?;
            visits.push(AccessSiteVisit {
                site: site.site.clone(),
                engagement_date,
            });
        }
    }
    log::info!(
        "access_site: generated {} visits across {} sites",
        visits.len(),
        config.sites.len()
    );
    Ok(visits)
}
