pub mod booking;
pub mod event;
pub mod peers;
pub mod schedule;
pub mod ticket;

pub use booking::BookingService;
pub use event::{spawn_reconciler, EventService, ReconcileReport};
pub use peers::{
    EventDirectory, LocalQuotaLedger, QuotaLedger, RemoteEventDirectory, RemoteQuotaLedger,
};
pub use schedule::{ScheduleAuthority, SpaceMasterClient, SPACEMASTER_OPERATIONS};
pub use ticket::TicketService;
