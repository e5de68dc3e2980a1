use crate::dao::models::ParticipantColorEntity;

/// HSV color shown next to a participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipantColor {
    /// Hue in degrees.
    pub h: f32,
    /// Saturation in `[0, 1]`.
    pub s: f32,
    /// Value in `[0, 1]`.
    pub v: f32,
}

/// Pick the palette color for a peer id.
///
/// The choice is a pure function of the id, so every client derives the same
/// color without coordination. Uses FNV-1a over the id bytes.
pub fn participant_color(palette: &[ParticipantColor], peer_id: &str) -> ParticipantColor {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    if palette.is_empty() {
        return ParticipantColor {
            h: 0.0,
            s: 0.0,
            v: 1.0,
        };
    }

    let mut hash = FNV_OFFSET;
    for byte in peer_id.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    palette[(hash % palette.len() as u64) as usize]
}

impl From<ParticipantColorEntity> for ParticipantColor {
    fn from(value: ParticipantColorEntity) -> Self {
        Self {
            h: value.h,
            s: value.s,
            v: value.v,
        }
    }
}

impl From<ParticipantColor> for ParticipantColorEntity {
    fn from(value: ParticipantColor) -> Self {
        Self {
            h: value.h,
            s: value.s,
            v: value.v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> Vec<ParticipantColor> {
        (0..8)
            .map(|i| ParticipantColor {
                h: i as f32 * 45.0,
                s: 1.0,
                v: 1.0,
            })
            .collect()
    }

    #[test]
    fn color_derivation_is_deterministic() {
        let palette = palette();
        let first = participant_color(&palette, "peer-1234");
        let second = participant_color(&palette, "peer-1234");
        assert_eq!(first, second);
    }

    #[test]
    fn color_derivation_stays_within_the_palette() {
        let palette = palette();
        for i in 0..64 {
            let color = participant_color(&palette, &format!("peer-{i}"));
            assert!(palette.contains(&color));
        }
    }

    #[test]
    fn empty_palette_falls_back_to_white() {
        let color = participant_color(&[], "anyone");
        assert_eq!(color.v, 1.0);
        assert_eq!(color.s, 0.0);
    }
}
