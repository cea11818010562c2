use futures::future::BoxFuture;

/// Minimum chargeable amount, in minor units (one whole currency unit).
const MIN_AMOUNT_MINOR_UNITS: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Amount must be at least 1 currency unit")]
    AmountTooSmall,

    #[error("Gateway error: {0}")]
    Provider(String),
}

/// Opens a provider order for the given minor-unit amount and returns the
/// provider's order handle. Rejects sub-unit amounts before touching the
/// network.
pub fn create_order<'a>(
    client: &'a stripe::Client,
    currency: stripe::Currency,
) -> impl FnOnce(i64) -> BoxFuture<'a, Result<String, GatewayError>> {
    move |amount: i64| {
        Box::pin(async move {
            if amount < MIN_AMOUNT_MINOR_UNITS {
                return Err(GatewayError::AmountTooSmall);
            }
            let params = stripe::CreatePaymentIntent::new(amount, currency);
            let intent = stripe::PaymentIntent::create(client, params)
                .await
                .map_err(|e| GatewayError::Provider(e.to_string()))?;
            Ok(intent.id.to_string())
        })
    }
}

/// Checks a completion callback against the provider: the order must exist,
/// be in a succeeded state, and the presented signature must match the
/// order's client secret. Returns Ok(false) on mismatch; Err only for
/// transport/provider failures.
pub fn verify_signature<'a>(
    client: &'a stripe::Client,
) -> impl FnOnce(String, String, String) -> BoxFuture<'a, Result<bool, GatewayError>> {
    move |order_id: String, gateway_payment_id: String, signature: String| {
        Box::pin(async move {
            let intent_id = order_id
                .parse::<stripe::PaymentIntentId>()
                .map_err(|e| GatewayError::Provider(e.to_string()))?;
            let intent = stripe::PaymentIntent::retrieve(client, &intent_id, &[])
                .await
                .map_err(|e| GatewayError::Provider(e.to_string()))?;
            let succeeded = intent.status == stripe::PaymentIntentStatus::Succeeded;
            let secret_matches = intent.client_secret.as_deref() == Some(signature.as_str());
            Ok(succeeded && secret_matches && !gateway_payment_id.is_empty())
        })
    }
}
