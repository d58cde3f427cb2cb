/// Camera centre in world pixels, optionally following one character
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Camera {
    following: Option<String>,
    center: (f32, f32),
}

impl Camera {
    /// Follow `id`, replacing whatever was followed before
    pub fn follow(&mut self, id: &str) {
        self.following = Some(id.to_string());
    }

    pub fn stop_follow(&mut self) {
        self.following = None;
    }

    pub fn following(&self) -> Option<&str> {
        self.following.as_deref()
    }

    pub fn center(&self) -> (f32, f32) {
        self.center
    }

    pub fn center_on(&mut self, center: (f32, f32)) {
        self.center = center;
    }
}
