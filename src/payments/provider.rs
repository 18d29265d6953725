use crate::payments::error::GatewayResult;
use crate::payments::types::{CardDetails, CardToken, ChargeRequest, GatewayCharge};
use async_trait::async_trait;

/// Card payment gateway
#[async_trait]
pub trait CardGateway: Send + Sync {
    /// Exchange raw card details for a single-use token.
    async fn create_token(&self, card: &CardDetails) -> GatewayResult<CardToken>;

    async fn create_charge(&self, request: ChargeRequest) -> GatewayResult<GatewayCharge>;

    async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<GatewayCharge>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;

    struct MockGateway;

    #[async_trait]
    impl CardGateway for MockGateway {
        async fn create_token(&self, card: &CardDetails) -> GatewayResult<CardToken> {
            Ok(CardToken {
                id: "tokn_mock".to_string(),
                last_digits: Some(card.number[card.number.len() - 4..].to_string()),
                brand: Some("Visa".to_string()),
            })
        }

        async fn create_charge(&self, request: ChargeRequest) -> GatewayResult<GatewayCharge> {
            Ok(GatewayCharge {
                id: "chrg_mock".to_string(),
                paid: true,
                amount: request.amount_minor,
                currency: request.currency,
                failure_code: None,
                failure_message: None,
            })
        }

        async fn retrieve_charge(&self, charge_id: &str) -> GatewayResult<GatewayCharge> {
            Ok(GatewayCharge {
                id: charge_id.to_string(),
                paid: false,
                amount: 0,
                currency: "thb".to_string(),
                failure_code: None,
                failure_message: None,
            })
        }

        fn name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn trait_can_be_implemented_by_mock_gateway() {
        let gateway: Box<dyn CardGateway> = Box::new(MockGateway);
        let token = gateway
            .create_token(&CardDetails {
                name: "Test".to_string(),
                number: "4242424242424242".to_string(),
                expiration_month: 1,
                expiration_year: 2031,
                security_code: "123".to_string(),
                city: None,
                postal_code: None,
            })
            .await
            .expect("token creation should succeed");
        assert_eq!(token.last_digits.as_deref(), Some("4242"));

        let charge = gateway
            .create_charge(ChargeRequest {
                amount_minor: 100_000,
                currency: "thb".to_string(),
                token: token.id,
                description: "order".to_string(),
                order_id: "o1".to_string(),
            })
            .await
            .expect("charge should succeed");
        assert_eq!(charge.payment_status(), PaymentStatus::Successful);

        let retrieved = gateway.retrieve_charge("chrg_1").await.unwrap();
        assert_eq!(retrieved.payment_status(), PaymentStatus::Pending);
        assert_eq!(gateway.name(), "mock");
    }
}
