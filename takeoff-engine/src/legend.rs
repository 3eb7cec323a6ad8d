use std::collections::{BTreeMap, HashSet};

use takeoff_core::color::Rgba;
use takeoff_core::takeoff::{GroupKey, ItemId, TakeoffItem};

/// 图例行：按（类型, 子类型）聚合当前页的工程量条目。
#[derive(Debug, Clone, PartialEq)]
pub struct LegendGroup {
    pub key: GroupKey,
    pub color: Rgba,
    pub unit: String,
    pub total_quantity: f64,
    pub visible: bool,
    pub has_geometry: bool,
    pub items: Vec<ItemId>,
}

impl LegendGroup {
    pub fn label(&self) -> &str {
        self.key.label()
    }

    /// 没有任何成员带几何时，该组无法在图上显示，也不可切换。
    #[inline]
    pub fn can_toggle(&self) -> bool {
        self.has_geometry
    }
}

/// 按（页码, 分组键）记录的显隐标记。默认全部可见，只记录被隐藏的组；
/// 同页同键的条目共享同一标记，其他页不受影响。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilityIndex {
    hidden: HashSet<(u32, GroupKey)>,
}

impl VisibilityIndex {
    #[inline]
    pub fn is_visible(&self, page_number: u32, key: &GroupKey) -> bool {
        !self.hidden.contains(&(page_number, key.clone()))
    }

    pub fn set_visible(&mut self, page_number: u32, key: &GroupKey, visible: bool) {
        if visible {
            self.hidden.remove(&(page_number, key.clone()));
        } else {
            self.hidden.insert((page_number, key.clone()));
        }
    }

    /// 切换显隐，返回切换后的状态。
    pub fn toggle(&mut self, page_number: u32, key: &GroupKey) -> bool {
        let visible = !self.is_visible(page_number, key);
        self.set_visible(page_number, key, visible);
        visible
    }

    /// 恢复整份文档的显隐（切换文档时）。
    pub fn reset(&mut self) {
        self.hidden.clear();
    }

    pub fn show_all(&mut self, page_number: u32) {
        self.hidden.retain(|(page, _)| *page != page_number);
    }

    pub fn hide_all<'a>(&mut self, page_number: u32, keys: impl IntoIterator<Item = &'a GroupKey>) {
        self.hidden
            .extend(keys.into_iter().map(|key| (page_number, key.clone())));
    }

    /// 覆盖层只绘制带几何且所在分组可见的条目。
    #[inline]
    pub fn is_item_drawable(&self, item: &TakeoffItem) -> bool {
        item.has_geometry() && self.is_visible(item.page_number, &item.group_key())
    }
}

/// 构建当前页的图例，按分组键排序。
pub fn build_legend(
    items: &[TakeoffItem],
    page_number: u32,
    visibility: &VisibilityIndex,
) -> Vec<LegendGroup> {
    let mut groups: BTreeMap<GroupKey, LegendGroup> = BTreeMap::new();
    for item in items.iter().filter(|item| item.page_number == page_number) {
        let key = item.group_key();
        let group = groups.entry(key.clone()).or_insert_with(|| LegendGroup {
            color: key.color(),
            unit: item.unit.clone(),
            total_quantity: 0.0,
            visible: visibility.is_visible(page_number, &key),
            has_geometry: false,
            items: Vec::new(),
            key,
        });
        if item.quantity.is_finite() {
            group.total_quantity += item.quantity;
        }
        group.has_geometry |= item.has_geometry();
        group.items.push(item.id.clone());
    }
    groups.into_values().collect()
}

/// 当前页条目统计，包含无几何条目。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSummary {
    pub page_number: u32,
    pub item_count: usize,
    pub drawable_count: usize,
    pub undrawable_count: usize,
    pub totals_by_unit: BTreeMap<String, f64>,
}

pub fn page_summary(items: &[TakeoffItem], page_number: u32) -> PageSummary {
    let mut summary = PageSummary {
        page_number,
        ..PageSummary::default()
    };
    for item in items.iter().filter(|item| item.page_number == page_number) {
        summary.item_count += 1;
        if item.has_geometry() {
            summary.drawable_count += 1;
        } else {
            summary.undrawable_count += 1;
        }
        if item.quantity.is_finite() {
            *summary.totals_by_unit.entry(item.unit.clone()).or_default() += item.quantity;
        }
    }
    summary
}

/// 当前页可绘制的条目。
pub fn drawable_items<'a>(
    items: &'a [TakeoffItem],
    page_number: u32,
    visibility: &'a VisibilityIndex,
) -> impl Iterator<Item = &'a TakeoffItem> + 'a {
    items
        .iter()
        .filter(move |item| item.page_number == page_number && visibility.is_item_drawable(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use takeoff_core::geometry::Point2;
    use takeoff_core::takeoff::ItemGeometry;

    fn marker(x: f64, y: f64) -> Option<ItemGeometry> {
        Some(ItemGeometry::PointMarker {
            position: Point2::new(x, y),
        })
    }

    fn sample_items() -> Vec<TakeoffItem> {
        vec![
            TakeoffItem::new("w1", "wall", Some("exterior".into()), 10.0, "LF", 1).with_geometry(
                Some(ItemGeometry::Polyline {
                    points: vec![Point2::new(0.0, 0.0), Point2::new(100.0, 0.0)],
                }),
            ),
            TakeoffItem::new("w2", "wall", Some("exterior".into()), 5.5, "LF", 1)
                .with_geometry(None),
            TakeoffItem::new("w3", "wall", Some("interior".into()), 7.0, "LF", 1).with_geometry(
                Some(ItemGeometry::Polyline {
                    points: vec![Point2::new(0.0, 10.0), Point2::new(100.0, 10.0)],
                }),
            ),
            TakeoffItem::new("d1", "door", None, 1.0, "EA", 1).with_geometry(marker(10.0, 10.0)),
            TakeoffItem::new("d2", "door", None, 1.0, "EA", 2).with_geometry(marker(20.0, 20.0)),
            TakeoffItem::new("r1", "room", None, 120.0, "SF", 1).with_geometry(None),
        ]
    }

    #[test]
    fn legend_groups_by_type_and_subtype() {
        let items = sample_items();
        let legend = build_legend(&items, 1, &VisibilityIndex::default());
        let keys: Vec<String> = legend.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(keys, vec!["door", "room", "wall/exterior", "wall/interior"]);

        let exterior = &legend[2];
        assert!((exterior.total_quantity - 15.5).abs() < 1e-9);
        assert_eq!(exterior.items.len(), 2);
        assert!(exterior.has_geometry);
        assert_eq!(exterior.unit, "LF");
    }

    #[test]
    fn other_pages_are_not_aggregated() {
        let items = sample_items();
        let legend = build_legend(&items, 1, &VisibilityIndex::default());
        let door = legend.iter().find(|g| g.key.item_type == "door").unwrap();
        assert_eq!(door.items, vec![ItemId::new("d1")]);
        assert!((door.total_quantity - 1.0).abs() < f64::EPSILON);

        let visibility = VisibilityIndex::default();
        let drawn: Vec<&str> = drawable_items(&items, 2, &visibility)
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(drawn, vec!["d2"]);
    }

    #[test]
    fn groups_without_geometry_cannot_be_shown() {
        let items = sample_items();
        let legend = build_legend(&items, 1, &VisibilityIndex::default());
        let room = legend.iter().find(|g| g.key.item_type == "room").unwrap();
        assert!(!room.can_toggle());
        assert!((room.total_quantity - 120.0).abs() < f64::EPSILON);

        let summary = page_summary(&items, 1);
        assert_eq!(summary.item_count, 5);
        assert_eq!(summary.undrawable_count, 2);
        assert_eq!(summary.drawable_count, 3);
        assert!((summary.totals_by_unit["SF"] - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn toggling_a_key_affects_exactly_its_members() {
        let items = sample_items();
        let mut visibility = VisibilityIndex::default();
        let exterior = GroupKey::new("wall", Some("exterior".into()));
        assert!(!visibility.toggle(1, &exterior));

        for item in items.iter().filter(|item| item.page_number == 1) {
            let expected = item.group_key() != exterior;
            assert_eq!(
                visibility.is_visible(1, &item.group_key()),
                expected,
                "{}",
                item.id.as_str()
            );
        }
        let drawn: Vec<&str> = drawable_items(&items, 1, &visibility)
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(drawn, vec!["w3", "d1"]);

        assert!(visibility.toggle(1, &exterior));
        let keys: Vec<GroupKey> = items.iter().map(|i| i.group_key()).collect();
        visibility.hide_all(1, keys.iter());
        assert_eq!(drawable_items(&items, 1, &visibility).count(), 0);
        visibility.show_all(1);
        assert_eq!(drawable_items(&items, 1, &visibility).count(), 3);
    }

    #[test]
    fn hiding_a_group_leaves_other_pages_alone() {
        let items = sample_items();
        let mut visibility = VisibilityIndex::default();
        let door = GroupKey::new("door", None);
        assert!(!visibility.toggle(2, &door));

        assert_eq!(drawable_items(&items, 2, &visibility).count(), 0);
        let page_one: Vec<&str> = drawable_items(&items, 1, &visibility)
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(page_one, vec!["w1", "w3", "d1"]);
        let legend = build_legend(&items, 1, &visibility);
        assert!(legend.iter().find(|g| g.key == door).unwrap().visible);

        visibility.hide_all(1, [&door]);
        visibility.show_all(1);
        assert!(visibility.is_visible(1, &door));
        assert!(!visibility.is_visible(2, &door));
    }
}
