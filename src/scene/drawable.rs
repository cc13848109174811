// scene/drawable.rs

use crate::renderer::Material;
use crate::scene::Transform;

/// A mesh paired with the material that shades it.
#[derive(Debug, Clone)]
pub struct Drawable<M> {
    pub mesh: M,
    pub material: Material,
    pub transform: Transform,
}

impl<M> Drawable<M> {
    pub fn new(mesh: M, material: Material) -> Self {
        Self {
            mesh,
            material,
            transform: Transform::default(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}

/// Drawables toggled on and off together.
#[derive(Debug, Clone)]
pub struct DrawableCollection<M> {
    drawables: Vec<Drawable<M>>,
    pub visible: bool,
}

impl<M> Default for DrawableCollection<M> {
    fn default() -> Self {
        Self {
            drawables: Vec::new(),
            visible: true,
        }
    }
}

impl<M> DrawableCollection<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, drawable: Drawable<M>) {
        self.drawables.push(drawable);
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Drawable<M>> {
        self.drawables.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Drawable<M>> {
        self.drawables.iter_mut()
    }

    /// Applies `f` to every material in the collection.
    pub fn for_each_material(&mut self, mut f: impl FnMut(&mut Material)) {
        for drawable in &mut self.drawables {
            f(&mut drawable.material);
        }
    }
}

impl<M> Extend<Drawable<M>> for DrawableCollection<M> {
    fn extend<T: IntoIterator<Item = Drawable<M>>>(&mut self, iter: T) {
        self.drawables.extend(iter);
    }
}

/// The two collections the peeling core traverses.
#[derive(Debug, Clone)]
pub struct SceneLayers<M> {
    pub opaque: DrawableCollection<M>,
    pub transparent: DrawableCollection<M>,
}

impl<M> Default for SceneLayers<M> {
    fn default() -> Self {
        Self {
            opaque: DrawableCollection::new(),
            transparent: DrawableCollection::new(),
        }
    }
}

impl<M> SceneLayers<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, opaque: bool, transparent: bool) {
        self.opaque.visible = opaque;
        self.transparent.visible = transparent;
    }

    /// Visible drawables, opaque collection first.
    pub fn visible_mut(&mut self) -> impl Iterator<Item = &mut Drawable<M>> {
        let opaque = self.opaque.visible;
        let transparent = self.transparent.visible;
        self.opaque
            .iter_mut()
            .filter(move |_| opaque)
            .chain(self.transparent.iter_mut().filter(move |_| transparent))
    }
}
