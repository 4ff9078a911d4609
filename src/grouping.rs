use crate::color::Color;

/// Colors merged under one representative.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGroup {
    /// First color that opened the group. Later candidates are compared
    /// against this color only, never against the running mean.
    pub representative: Color,
    pub members: Vec<Color>,
}

impl ColorGroup {
    fn new(color: Color) -> Self {
        Self {
            representative: color,
            members: vec![color],
        }
    }

    /// Per-channel mean of all members, rounded to the nearest integer.
    pub fn mean(&self) -> Color {
        let n = self.members.len().max(1) as f64;
        let mut sum = [0.0f64; 3];
        for member in &self.members {
            sum[0] += member.r as f64;
            sum[1] += member.g as f64;
            sum[2] += member.b as f64;
        }
        Color::from_channels([sum[0] / n, sum[1] / n, sum[2] / n])
    }
}

/// Single-link grouping: each color joins the first group whose
/// representative lies strictly within `threshold`, otherwise it opens a new
/// group. The result depends on input order and is not transitive.
pub fn group_colors(colors: &[Color], threshold: f64) -> Vec<ColorGroup> {
    let mut groups: Vec<ColorGroup> = Vec::new();
    for &color in colors {
        match groups
            .iter_mut()
            .find(|group| color.distance(group.representative) < threshold)
        {
            Some(group) => group.members.push(color),
            None => groups.push(ColorGroup::new(color)),
        }
    }
    groups
}

/// Output color of every group, in group creation order.
pub fn grouped_colors(colors: &[Color], threshold: f64) -> Vec<Color> {
    group_colors(colors, threshold)
        .iter()
        .map(ColorGroup::mean)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_threshold_keeps_every_distinct_color() {
        let colors = [
            Color::new(10, 10, 10),
            Color::new(11, 10, 10),
            Color::new(200, 0, 0),
        ];
        let groups = group_colors(&colors, 0.0);
        assert_eq!(groups.len(), 3);
        assert_eq!(grouped_colors(&colors, 0.0), colors.to_vec());
    }

    #[test]
    fn test_members_average_with_rounding() {
        let colors = [Color::new(100, 0, 0), Color::new(103, 0, 1)];
        let groups = group_colors(&colors, 10.0);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].representative, Color::new(100, 0, 0));
        // (100 + 103) / 2 = 101.5 rounds up, (0 + 1) / 2 = 0.5 rounds up
        assert_eq!(groups[0].mean(), Color::new(102, 0, 1));
    }

    #[test]
    fn test_compares_against_first_member_not_mean() {
        // 0 -> 8 joins (distance 8), 16 is 16 from the representative 0 and
        // starts a new group even though it is only 12 from the mean 4
        let colors = [
            Color::new(0, 0, 0),
            Color::new(8, 0, 0),
            Color::new(16, 0, 0),
        ];
        let groups = group_colors(&colors, 10.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[1].representative, Color::new(16, 0, 0));
    }

    #[test]
    fn test_grouping_is_order_sensitive() {
        let a = Color::new(0, 0, 0);
        let b = Color::new(8, 0, 0);
        let c = Color::new(16, 0, 0);
        assert_eq!(group_colors(&[a, b, c], 10.0).len(), 2);
        assert_eq!(group_colors(&[b, a, c], 10.0).len(), 1);
    }

    #[test]
    fn test_joins_first_matching_group() {
        let colors = [
            Color::new(0, 0, 0),
            Color::new(20, 0, 0),
            Color::new(10, 0, 0),
        ];
        let groups = group_colors(&colors, 11.0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![Color::new(0, 0, 0), Color::new(10, 0, 0)]);
        assert!(groups.iter().all(|g| !g.members.is_empty()));
    }
}
