//! Demo data seeding.
//!
//! Only reachable when demo seeding is allowed by configuration. Every call appends `n`
//! new documents; writes are issued one at a time and the loop stops at the first
//! failed insert. Earlier inserts are kept.

use crate::backend::Connection;
use crate::constants::RESOURCES_COLLECTION;
use crate::SeedError;
use chrono::{DateTime, Duration, Utc};
use ehrview_types::DocumentId;
use fhir::{
    FhirVersion, Identifier, ProcessingState, Resource, ResourceData, ResourceMetadata, Timestamp,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const DEMO_RESOURCE_TYPES: [&str; 4] = [
    "Observation",
    "MedicationRequest",
    "AllergyIntolerance",
    "Condition",
];

const DEMO_STATES: [ProcessingState; 4] = [
    ProcessingState::NotStarted,
    ProcessingState::Processing,
    ProcessingState::Completed,
    ProcessingState::Failed,
];

const DEMO_NARRATIVE: &str =
    "Patient presented with mild symptoms; clinician advised monitoring and routine labs.";
const DEMO_SUMMARY: &str = "AI: Summary indicates low risk; recommend follow-up in 2 weeks.";

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Outcome of a completed seeding run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedReport {
    pub requested: usize,
    pub written: usize,
    /// Ids assigned by the backend, in write order.
    pub ids: Vec<DocumentId>,
}

/// Build one synthetic resource relative to `now`.
///
/// Created within the last day, fetched up to an hour later, processed five minutes
/// after fetch for roughly half of the documents.
pub fn generate_resource<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> ResourceData {
    let created = now - Duration::milliseconds(rng.gen_range(0..24 * 60 * 60 * 1000));
    let fetched = created + Duration::milliseconds(rng.gen_range(0..60 * 60 * 1000));
    let processed = rng
        .gen_bool(0.5)
        .then(|| Timestamp::from_datetime(fetched + Duration::minutes(5)));

    let resource_type = DEMO_RESOURCE_TYPES
        .choose(rng)
        .copied()
        .unwrap_or(DEMO_RESOURCE_TYPES[0]);
    let state = DEMO_STATES
        .choose(rng)
        .copied()
        .unwrap_or(ProcessingState::NotStarted);
    let version = if rng.gen_bool(0.5) {
        FhirVersion::R4
    } else {
        FhirVersion::R4B
    };

    ResourceData {
        metadata: ResourceMetadata {
            resource_type: resource_type.to_string(),
            state,
            version,
            created_time: Some(Timestamp::from_datetime(created)),
            fetch_time: Some(Timestamp::from_datetime(fetched)),
            processed_time: processed,
            identifier: Identifier {
                key: format!("res_{}", base36(rng, 6)),
                uid: format!("u_{}", base36(rng, 6)),
                patient_id: format!("p_{}", rng.gen_range(100_000..1_000_000)),
            },
        },
        human_readable: DEMO_NARRATIVE.to_string(),
        ai_summary: rng.gen_bool(0.7).then(|| DEMO_SUMMARY.to_string()),
    }
}

fn base36<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

/// Seed `n` demo documents using an entropy-seeded generator.
pub async fn seed(connection: &Connection, n: usize) -> Result<SeedReport, SeedError> {
    let mut rng = StdRng::from_entropy();
    seed_with_rng(connection, n, &mut rng, Utc::now()).await
}

/// Seed `n` demo documents with a caller-provided generator and clock.
///
/// # Errors
///
/// - [`SeedError::Session`] if the anonymous session cannot be established.
/// - [`SeedError::Write`] for the first insert that fails; it reports how many
///   documents were written before it.
pub async fn seed_with_rng<R: Rng + Send + ?Sized>(
    connection: &Connection,
    n: usize,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<SeedReport, SeedError> {
    let session = connection.ensure_session().await?;
    tracing::info!(requested = n, "seeding demo documents");

    let mut ids = Vec::with_capacity(n);
    for index in 0..n {
        let document = Resource::to_value(&generate_resource(rng, now))?;
        match connection
            .store()
            .add_document(&session, RESOURCES_COLLECTION, document)
            .await
        {
            Ok(id) => {
                tracing::debug!(%id, "demo document written");
                ids.push(id);
            }
            Err(source) => {
                tracing::warn!(
                    failed_at = index + 1,
                    written = ids.len(),
                    "demo seed write failed: {source}"
                );
                return Err(SeedError::Write {
                    failed_at: index + 1,
                    written: ids.len(),
                    requested: n,
                    source,
                });
            }
        }
    }

    tracing::info!(written = ids.len(), "demo seeding finished");
    Ok(SeedReport {
        requested: n,
        written: ids.len(),
        ids,
    })
}
