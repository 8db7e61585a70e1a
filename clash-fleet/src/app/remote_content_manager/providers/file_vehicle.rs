use async_trait::async_trait;

use super::{ProviderVehicle, ProviderVehicleType};

pub struct Vehicle {
    path: String,
}

impl Vehicle {
    pub fn new(path: &str) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProviderVehicle for Vehicle {
    async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    fn path(&self) -> &str {
        self.path.as_str()
    }

    fn typ(&self) -> ProviderVehicleType {
        ProviderVehicleType::File
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderVehicle, ProviderVehicleType, Vehicle};

    #[tokio::test]
    async fn test_file_vehicle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.yaml");
        std::fs::write(&path, b"proxies: []").unwrap();

        let v = Vehicle::new(path.to_str().unwrap());
        assert_eq!(v.typ(), ProviderVehicleType::File);
        assert_eq!(v.read().await.unwrap(), b"proxies: []");

        let missing = Vehicle::new(dir.path().join("nope.yaml").to_str().unwrap());
        assert!(missing.read().await.is_err());
    }
}
