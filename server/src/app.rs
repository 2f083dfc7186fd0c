//! Builds the services a process runs from its configuration. Authorities
//! that live in the same process talk to each other directly; the others
//! are reached through their RPC endpoints.

use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::TokenKeys;
use crate::config::{Config, ServiceRole};
use crate::remote::{GraphqlClient, RemoteClient, RpcClient, ServiceCredentials};
use crate::services::{
    BookingService, EventDirectory, EventService, LocalQuotaLedger, QuotaLedger,
    RemoteEventDirectory, RemoteQuotaLedger, SpaceMasterClient, TicketService,
    SPACEMASTER_OPERATIONS,
};
use crate::stores::{
    BookingStore, EventStore, MemoryBookingStore, MemoryEventStore, MemoryTicketStore,
    PgBookingStore, PgEventStore, PgTicketStore, TicketStore,
};

pub enum Storage {
    Memory,
    Postgres(PgPool),
}

impl Storage {
    fn events(&self) -> Arc<dyn EventStore> {
        match self {
            Storage::Memory => Arc::new(MemoryEventStore::new()),
            Storage::Postgres(pool) => Arc::new(PgEventStore::new(pool.clone())),
        }
    }

    fn tickets(&self) -> Arc<dyn TicketStore> {
        match self {
            Storage::Memory => Arc::new(MemoryTicketStore::new()),
            Storage::Postgres(pool) => Arc::new(PgTicketStore::new(pool.clone())),
        }
    }

    fn bookings(&self) -> Arc<dyn BookingStore> {
        match self {
            Storage::Memory => Arc::new(MemoryBookingStore::new()),
            Storage::Postgres(pool) => Arc::new(PgBookingStore::new(pool.clone())),
        }
    }
}

/// The authorities served by this process. At least one is present.
pub struct Authorities {
    pub keys: Arc<TokenKeys>,
    pub events: Option<Arc<EventService>>,
    pub tickets: Option<Arc<TicketService>>,
    pub bookings: Option<Arc<BookingService>>,
}

fn serves(role: ServiceRole, authority: ServiceRole) -> bool {
    role == authority || role == ServiceRole::All
}

impl Authorities {
    pub fn build(config: &Config, storage: &Storage, http: reqwest::Client) -> Self {
        let keys = Arc::new(TokenKeys::new(&config.jwt_secret));
        let credentials = ServiceCredentials {
            keys: keys.clone(),
            subject: format!("{}-service", config.role),
        };
        let peer = |endpoint: &str| -> Arc<dyn RemoteClient> {
            Arc::new(
                RpcClient::new(http.clone(), endpoint).with_credentials(credentials.clone()),
            )
        };

        let events = serves(config.role, ServiceRole::Event).then(|| {
            let schedule = GraphqlClient::new(
                http.clone(),
                config.schedule_authority_url.clone(),
                SPACEMASTER_OPERATIONS,
            );
            Arc::new(EventService::new(
                storage.events(),
                Arc::new(SpaceMasterClient::new(
                    Arc::new(schedule),
                    config.schedule_timeout,
                )),
            ))
        });

        let directory: Arc<dyn EventDirectory> = match &events {
            Some(events) => events.clone(),
            None => Arc::new(RemoteEventDirectory::new(
                peer(&config.event_service_url),
                config.remote_timeout,
            )),
        };

        let tickets = serves(config.role, ServiceRole::Ticket)
            .then(|| Arc::new(TicketService::new(storage.tickets(), directory.clone())));

        let bookings = serves(config.role, ServiceRole::Booking).then(|| {
            let ledger: Arc<dyn QuotaLedger> = match &tickets {
                Some(tickets) => Arc::new(LocalQuotaLedger::new(tickets.clone(), "booking-service")),
                None => Arc::new(RemoteQuotaLedger::new(
                    peer(&config.ticket_service_url),
                    config.remote_timeout,
                )),
            };
            Arc::new(BookingService::new(
                storage.bookings(),
                directory.clone(),
                ledger,
            ))
        });

        Self {
            keys,
            events,
            tickets,
            bookings,
        }
    }
}
