//! Fixed test IDs for deterministic tests.

use uuid::Uuid;

// Organization IDs (1000-1099)
pub const TEST_ORG_ACME: Uuid = Uuid::from_u128(1000);
pub const TEST_ORG_GLOBEX: Uuid = Uuid::from_u128(1001);

// Machine identity IDs (2000-2099)
pub const TEST_IDENTITY_CI: Uuid = Uuid::from_u128(2000);
pub const TEST_IDENTITY_DEPLOY: Uuid = Uuid::from_u128(2001);
pub const TEST_IDENTITY_OTHER_ORG: Uuid = Uuid::from_u128(2002);

// User IDs (100-199)
pub const TEST_USER_ALICE: Uuid = Uuid::from_u128(100);
pub const TEST_USER_MALLORY: Uuid = Uuid::from_u128(101);

// Signing key material
pub const TEST_SIGNING_SEED: u8 = 42;
pub const TEST_GOOGLE_KEY_SEED: u8 = 7;
pub const TEST_GOOGLE_KEY_ID: &str = "google-test-key-1";

// Google identity attributes
pub const TEST_AUDIENCE: &str = "https://gcp-auth.test";
pub const TEST_PROJECT_A: &str = "proj-a";
pub const TEST_PROJECT_B: &str = "proj-b";
pub const TEST_ZONE: &str = "us-central1-a";
pub const TEST_SA_PROJ_A: &str = "ci-runner@proj-a.iam.gserviceaccount.com";
pub const TEST_SA_PROJ_B: &str = "ci-runner@proj-b.iam.gserviceaccount.com";
