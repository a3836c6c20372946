use std::fmt;

use crate::error::Error;

/// Spatial edge length of network inputs.
pub const IMAGE_SIZE: usize = 224;

/// Color channels of network inputs.
pub const IMAGE_CHANNELS: usize = 3;

/// Number of scored classes.
pub const CLASS_COUNT: usize = 1000;

/// Edge length of the pooling windows between convolution groups.
pub const POOL_SIZE: usize = 2;


/// Identifies one weighted layer of the network. Variants order
/// the same way the layers stack.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerId {
  Conv1_1, Conv1_2,
  Conv2_1, Conv2_2,
  Conv3_1, Conv3_2, Conv3_3, Conv3_4,
  Conv4_1, Conv4_2, Conv4_3, Conv4_4,
  Conv5_1, Conv5_2, Conv5_3, Conv5_4,
  Fc6, Fc7, Fc8,
}

/// Shape of one weighted layer as listed in [ARCHITECTURE].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
  /// Square convolution kernels producing `features` output channels.
  Conv { kernel: usize, features: usize },
  /// Fully connected projection onto `features` outputs.
  Dense { features: usize },
}

use LayerId::*;
use LayerKind::{ Conv, Dense };

/// The nineteen weighted layers in network order.

pub const ARCHITECTURE: [(LayerId, LayerKind); 19] = [
  (Conv1_1, Conv { kernel: 3, features: 64 }),
  (Conv1_2, Conv { kernel: 3, features: 64 }),
  (Conv2_1, Conv { kernel: 3, features: 128 }),
  (Conv2_2, Conv { kernel: 3, features: 128 }),
  (Conv3_1, Conv { kernel: 3, features: 256 }),
  (Conv3_2, Conv { kernel: 3, features: 256 }),
  (Conv3_3, Conv { kernel: 3, features: 256 }),
  (Conv3_4, Conv { kernel: 3, features: 256 }),
  (Conv4_1, Conv { kernel: 3, features: 512 }),
  (Conv4_2, Conv { kernel: 3, features: 512 }),
  (Conv4_3, Conv { kernel: 3, features: 512 }),
  (Conv4_4, Conv { kernel: 3, features: 512 }),
  (Conv5_1, Conv { kernel: 3, features: 512 }),
  (Conv5_2, Conv { kernel: 3, features: 512 }),
  (Conv5_3, Conv { kernel: 3, features: 512 }),
  (Conv5_4, Conv { kernel: 3, features: 512 }),
  (Fc6, Dense { features: 4096 }),
  (Fc7, Dense { features: 4096 }),
  (Fc8, Dense { features: 1000 }),
];

/// Layers followed by a pooling step.

pub const POOL_AFTER: [LayerId; 5] = [Conv1_2, Conv2_2, Conv3_4, Conv4_4, Conv5_4];

impl LayerId {
  pub fn as_str(self) -> &'static str {
    match self {
      Conv1_1 => "conv1_1", Conv1_2 => "conv1_2",
      Conv2_1 => "conv2_1", Conv2_2 => "conv2_2",
      Conv3_1 => "conv3_1", Conv3_2 => "conv3_2", Conv3_3 => "conv3_3", Conv3_4 => "conv3_4",
      Conv4_1 => "conv4_1", Conv4_2 => "conv4_2", Conv4_3 => "conv4_3", Conv4_4 => "conv4_4",
      Conv5_1 => "conv5_1", Conv5_2 => "conv5_2", Conv5_3 => "conv5_3", Conv5_4 => "conv5_4",
      Fc6 => "fc6", Fc7 => "fc7", Fc8 => "fc8",
    }
  }

  /// Looks up this layer's entry in [ARCHITECTURE].
  pub fn kind(self) -> LayerKind {
    ARCHITECTURE.iter()
      .find(|&&(id, _)| id == self )
      .map(|&(_, kind)| kind )
      .unwrap()
  }

  pub fn pooled_after(self) -> bool {
    POOL_AFTER.contains(&self)
  }
}

impl std::str::FromStr for LayerId {
  type Err = Error;

  fn from_str(name: &str) -> Result<Self, Error> {
    ARCHITECTURE.iter()
      .map(|&(id, _)| id )
      .find(|id| id.as_str() == name )
      .ok_or_else(|| Error::UnknownLayer(name.into()) )
  }
}

impl fmt::Display for LayerId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_is_ordered() {
    assert_eq!(ARCHITECTURE.len(), 19);
    for pair in ARCHITECTURE.windows(2) {
      assert!(pair[0].0 < pair[1].0);
    }
  }

  #[test]
  fn names_round_trip() {
    for (id, _) in ARCHITECTURE {
      assert_eq!(id.as_str().parse::<LayerId>().unwrap(), id);
    }
    assert!("conv6_1".parse::<LayerId>().is_err());
  }

  #[test]
  fn pooling_positions() {
    assert_eq!(POOL_AFTER.len(), 5);
    assert!(Conv1_2.pooled_after());
    assert!(!Conv3_3.pooled_after());
    assert!(!Fc6.pooled_after());
  }

  #[test]
  fn feature_progression() {
    let features: Vec<usize> = ARCHITECTURE.iter()
      .filter_map(|&(_, kind)| match kind {
        Conv { features, .. } => Some(features),
        Dense { .. } => None,
      })
      .collect();
    assert_eq!(features, vec![
      64, 64, 128, 128,
      256, 256, 256, 256,
      512, 512, 512, 512,
      512, 512, 512, 512,
    ]);
  }
}
