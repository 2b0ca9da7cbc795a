pub mod medical;
pub mod pet;
pub mod session;
pub mod settings;

pub use medical::{
    Appointment, AppointmentStatus, ChatTurn, DiagnosisEntry, DonationKind, Likelihood,
    ListingKind, ProviderListing,
};
pub use pet::{PetMood, PetState};
pub use session::FocusSession;
pub use settings::{DocbookSettings, FocusSettings, PetType, ThemeType};
