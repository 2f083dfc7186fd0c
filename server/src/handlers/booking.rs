use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::{parse_operation, RpcState};
use crate::auth::Caller;
use crate::models::booking::NewBooking;
use crate::services::BookingService;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
#[serde(
    tag = "operation",
    content = "arguments",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BookingOperation {
    Booking { id: Uuid },
    BookingsByUser { user_id: String },
    CreateBooking(NewBooking),
    ConfirmPayment { id: Uuid },
    CancelBooking { id: Uuid },
}

pub async fn rpc(
    State(state): State<RpcState<BookingService>>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, AppError> {
    let bookings = &state.service;
    let response = match parse_operation(&body)? {
        BookingOperation::Booking { id } => {
            success(bookings.get(&caller, id).await?, "Booking retrieved")
        }
        BookingOperation::BookingsByUser { user_id } => success(
            bookings.list_by_user(&caller, &user_id).await?,
            "Bookings retrieved",
        ),
        BookingOperation::CreateBooking(input) => {
            success(bookings.create(&caller, input).await?, "Booking created")
        }
        BookingOperation::ConfirmPayment { id } => success(
            bookings.confirm_payment(&caller, id).await?,
            "Payment confirmed",
        ),
        BookingOperation::CancelBooking { id } => {
            success(bookings.cancel(&caller, id).await?, "Booking cancelled")
        }
    };
    Ok(response)
}
