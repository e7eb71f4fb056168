use super::{Config, ConfigError};

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backends()?;

        if self.connections == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connections must be greater than 0".to_string(),
            ));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        self.tail_socket_addr()?;

        Ok(())
    }
}
