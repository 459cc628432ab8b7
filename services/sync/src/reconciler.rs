use std::str::FromStr;

use chrono::{Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use atrium_db::clients::models::Client;
use atrium_db::clients::repositories::ClientRepository;
use atrium_db::people::models::{Person, Practice};
use atrium_db::people::repositories::PersonRepository;
use atrium_db::projects::models::{CommercialModel, Project};
use atrium_db::projects::repositories::ProjectRepository;

use crate::crm::models::{Company, Deal, Owner};
use crate::settings::{SyncSettings, REVENUE_SHARE_CUTOFF_MINOR};
use crate::SyncError;

/// Pre-reconciliation check of required source fields. A failing validation
/// short-circuits the record before any resolution or store access.
#[derive(Debug, Clone)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(deal: &Deal) -> Validation {
    let mut errors = Vec::new();
    if deal.name().is_none() {
        errors.push("dealname is missing".to_string());
    }
    if deal.pipeline().is_none() {
        errors.push("pipeline is missing".to_string());
    }
    if deal.stage().is_none() {
        errors.push("dealstage is missing".to_string());
    }
    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// How the owning client was resolved, so callers and tests can assert on
/// which path was taken.
#[derive(Debug, Clone)]
pub enum ClientResolution {
    /// Matched on the external company id.
    Found(Client),
    /// Matched on name; the external company id was backfilled.
    Backfilled(Client),
    /// No match; a new client was created from the company record.
    Created(Client),
}

impl ClientResolution {
    pub fn client(&self) -> &Client {
        match self {
            Self::Found(c) | Self::Backfilled(c) | Self::Created(c) => c,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    /// The full set of project fields to create or update.
    pub project: Project,
    pub client: ClientResolution,
    pub is_update: bool,
}

/// Maps one CRM deal (plus its resolved associations) onto the domain
/// Client/Project model. Pure with respect to its inputs except for the
/// client find-or-create, which writes and is not rolled back if a later
/// step fails.
pub struct Reconciler<P, C, R> {
    people: P,
    clients: C,
    projects: R,
    settings: SyncSettings,
}

impl<P, C, R> Reconciler<P, C, R>
where
    P: PersonRepository,
    C: ClientRepository,
    R: ProjectRepository,
{
    pub fn new(people: P, clients: C, projects: R, settings: SyncSettings) -> Self {
        Self {
            people,
            clients,
            projects,
            settings,
        }
    }

    pub async fn reconcile(
        &self,
        deal: &Deal,
        company: &Company,
        owner: Option<&Owner>,
        existing: Option<&Project>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let value_owner = self.resolve_value_owner(owner).await?;
        let practice = self.resolve_primary_practice(&value_owner).await?;

        let amount_minor = parse_amount_minor(deal.amount(), &deal.id);
        let commercial_model = derive_commercial_model(amount_minor);

        let client = self.resolve_client(company).await?;

        let code = match existing {
            Some(project) => project.code.clone(),
            None => self.next_project_code(&client.client().name).await?,
        };

        let status = self
            .settings
            .status_for_stage(deal.stage().unwrap_or_default());

        let now = Utc::now();
        let project = Project {
            id: existing.map(|p| p.id).unwrap_or_else(Uuid::new_v4),
            client_id: client.client().id,
            code,
            name: deal.name().unwrap_or_default().to_string(),
            status,
            commercial_model,
            amount_minor,
            value_owner_id: value_owner.id,
            practice_id: practice.id,
            // Operator-authored notes survive updates untouched
            notes: existing.and_then(|p| p.notes.clone()),
            external_deal_id: Some(deal.id.clone()),
            created_at: existing.map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };

        Ok(ReconcileOutcome {
            project,
            client,
            is_update: existing.is_some(),
        })
    }

    /// Resolve the person who owns margin responsibility for the project.
    /// Email match first, then the longest-tenured active partner. Neither
    /// existing is fatal for the record: the system cannot attribute
    /// ownership.
    async fn resolve_value_owner(&self, owner: Option<&Owner>) -> Result<Person, SyncError> {
        if let Some(email) = owner.and_then(|o| o.email.as_deref()) {
            if let Some(person) = self.people.find_by_email(email).await? {
                return Ok(person);
            }
            tracing::debug!(email, "no person matches CRM owner email, using default");
        }

        match self.people.default_value_owner().await? {
            Some(person) => Ok(person),
            None => Err(SyncError::Record(
                "no value owner could be resolved and no default partner exists".to_string(),
            )),
        }
    }

    /// Attribution is meaningless without exactly one primary practice.
    async fn resolve_primary_practice(&self, person: &Person) -> Result<Practice, SyncError> {
        let practices = self.people.primary_practices(person.id).await?;
        match practices.as_slice() {
            [practice] => Ok(practice.clone()),
            [] => Err(SyncError::Record(format!(
                "value owner {} has no primary practice",
                person.display_name
            ))),
            _ => Err(SyncError::Record(format!(
                "value owner {} has multiple primary practices",
                person.display_name
            ))),
        }
    }

    /// Find-or-create, in match order: external company id, then
    /// case-insensitive name (backfilling the external id), then create.
    async fn resolve_client(&self, company: &Company) -> Result<ClientResolution, SyncError> {
        if let Some(found) = self
            .clients
            .find_by_external_company_id(&company.id)
            .await?
        {
            return Ok(ClientResolution::Found(found));
        }

        let name = company.display_name().ok_or_else(|| {
            SyncError::Record(format!("company {} has no usable name", company.id))
        })?;

        if let Some(found) = self.clients.find_by_name(name).await? {
            let backfilled = self
                .clients
                .set_external_company_id(found.id, &company.id)
                .await?;
            return Ok(ClientResolution::Backfilled(backfilled));
        }

        let now = Utc::now();
        let created = self
            .clients
            .create(Client {
                id: Uuid::new_v4(),
                name: name.to_string(),
                domain: company.properties.domain.clone(),
                industry: company.properties.industry.clone(),
                external_company_id: Some(company.id.clone()),
                created_at: now,
                updated_at: now,
            })
            .await?;
        Ok(ClientResolution::Created(created))
    }

    /// `PPP-YYYY-NNN`: client-name prefix, current year, next sequence for
    /// that prefix+year. Two concurrent creations for the same new
    /// client/year can compute the same sequence; the unique index on code
    /// turns that race into a record-level error instead of a duplicate.
    async fn next_project_code(&self, client_name: &str) -> Result<String, SyncError> {
        let prefix = code_prefix(client_name);
        let year = Utc::now().year();
        let scan_prefix = format!("{prefix}-{year}-");
        let latest = self.projects.latest_code_with_prefix(&scan_prefix).await?;
        let sequence = next_sequence(latest.as_deref());
        Ok(format!("{scan_prefix}{sequence:03}"))
    }
}

/// Three-letter code prefix from a client name: letters only, uppercased,
/// right-padded with `X` when shorter than three.
pub fn code_prefix(client_name: &str) -> String {
    let mut prefix: String = client_name
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .take(3)
        .collect();
    while prefix.len() < 3 {
        prefix.push('X');
    }
    prefix
}

/// Sequence following the highest existing code, or 1 for a fresh
/// prefix+year.
pub fn next_sequence(latest_code: Option<&str>) -> u32 {
    latest_code
        .and_then(|code| code.rsplit('-').next())
        .and_then(|raw| raw.parse::<u32>().ok())
        .map(|n| n + 1)
        .unwrap_or(1)
}

/// Parse the CRM amount string into minor currency units, rounding half
/// away from zero. Absent or unparseable input yields zero with a warning;
/// this is never fatal.
pub fn parse_amount_minor(raw: Option<&str>, deal_id: &str) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };

    // Tolerate thousands separators and stray whitespace
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{a0}'))
        .collect();

    match Decimal::from_str(&cleaned) {
        Ok(amount) => (amount * Decimal::from(100))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .unwrap_or_else(|| {
                tracing::warn!(deal_id, raw, "amount out of range, defaulting to zero");
                0
            }),
        Err(_) => {
            tracing::warn!(deal_id, raw, "unparseable amount, defaulting to zero");
            0
        }
    }
}

/// Commercial model from the parsed amount: at or above the cutoff is
/// revenue-share, any other positive amount is fixed-fee, zero is an
/// internal engagement.
pub fn derive_commercial_model(amount_minor: i64) -> CommercialModel {
    if amount_minor >= REVENUE_SHARE_CUTOFF_MINOR {
        CommercialModel::RevenueShare
    } else if amount_minor > 0 {
        CommercialModel::FixedFee
    } else {
        CommercialModel::Internal
    }
}
