//! Placing one replica on one hoster.

use strata_core::Endpoint;
use tracing::{debug, warn};

use crate::wire::CreateMetadataRequest;
use crate::{PeerClient, PeerError};

/// Send metadata and then the body to a single hoster.
///
/// If the body transfer fails after the metadata was accepted, the hoster is
/// asked to drop the half-created record before the error is returned.
pub async fn upload_to_peer(
    client: &dyn PeerClient,
    endpoint: &Endpoint,
    metadata: &CreateMetadataRequest,
    body: &[u8],
) -> Result<(), PeerError> {
    let hash = &metadata.file_hash;
    client.create_metadata(endpoint, metadata).await?;

    if let Err(e) = client.upload_body(endpoint, hash, body).await {
        warn!("Uploading body of {hash} to {endpoint} failed: {e}");
        if let Err(cleanup) = client.delete_file(endpoint, hash).await {
            warn!("Could not remove partial upload of {hash} from {endpoint}: {cleanup}");
        }
        return Err(e);
    }

    debug!("Uploaded {hash} to {endpoint}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use strata_core::{Address, BlobHash};

    use super::*;
    use crate::memory::{Behaviour, Call, MemoryNetwork};

    fn metadata() -> CreateMetadataRequest {
        CreateMetadataRequest {
            file_hash: BlobHash::new([9; 32]),
            owner_key: "key".to_string(),
            signature: "sig".to_string(),
            client_contract_address: Address::new("owner"),
            size: 4,
            hosts: None,
            replacing: None,
        }
    }

    #[tokio::test]
    async fn test_upload_places_body() {
        let network = MemoryNetwork::new();
        let endpoint = network.add_peer("a:1", Behaviour::Honest);

        upload_to_peer(&network, &endpoint, &metadata(), b"body")
            .await
            .unwrap();
        assert_eq!(
            network.stored(&endpoint, &metadata().file_hash),
            Some(b"body".to_vec())
        );
    }

    #[tokio::test]
    async fn test_failed_body_is_cleaned_up() {
        let network = MemoryNetwork::new();
        let endpoint = network.add_peer("a:1", Behaviour::RejectBody);

        let result = upload_to_peer(&network, &endpoint, &metadata(), b"body").await;
        assert!(result.is_err());
        assert!(network
            .calls(&endpoint)
            .contains(&Call::Delete(metadata().file_hash)));
    }

    #[tokio::test]
    async fn test_rejected_metadata_skips_body() {
        let network = MemoryNetwork::new();
        let endpoint = network.add_peer("a:1", Behaviour::RejectMetadata(402));

        let err = upload_to_peer(&network, &endpoint, &metadata(), b"body")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(402));
        assert_eq!(
            network.calls(&endpoint),
            vec![Call::CreateMetadata(metadata().file_hash)]
        );
    }
}
